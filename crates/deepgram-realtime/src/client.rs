use crate::types::{ControlMessage, ServerEvent};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::protocol::Message};

pub mod config;

type WsWriter =
    futures_util::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsReader = futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Outbound half of a live transcription stream.
pub struct StreamWriter {
    write: WsWriter,
}

/// Inbound half of a live transcription stream.
pub struct EventReader {
    read: WsReader,
}

/// Opens a streaming transcription session. The two halves can live on different tasks.
pub async fn connect(config: &config::Config) -> Result<(StreamWriter, EventReader)> {
    let request = config::build_request(config)?;
    let (ws_stream, _) = tokio_tungstenite::connect_async(request)
        .await
        .context("Failed to connect to Deepgram WebSocket")?;

    tracing::info!("Connected to Deepgram at {} Hz", config.sample_rate());
    let (write, read) = ws_stream.split();
    Ok((StreamWriter { write }, EventReader { read }))
}

impl StreamWriter {
    /// Sends one frame of 16-bit PCM as little-endian bytes.
    pub async fn send_audio(&mut self, samples: &[i16]) -> Result<()> {
        let bytes = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        self.write
            .send(Message::Binary(bytes))
            .await
            .context("Failed to send audio frame")
    }

    async fn send_control(&mut self, message: ControlMessage) -> Result<()> {
        let json = serde_json::to_string(&message)?;
        tracing::debug!("Sending {}", json);
        self.write
            .send(Message::Text(json))
            .await
            .with_context(|| format!("Failed to send {:?}", message))
    }

    /// Asks the server to flush remaining results and then close.
    pub async fn close_stream(&mut self) -> Result<()> {
        self.send_control(ControlMessage::CloseStream).await
    }

    /// Sends the websocket Close frame and flushes the sink.
    pub async fn close(&mut self) -> Result<()> {
        self.write
            .close()
            .await
            .context("Failed to close Deepgram WebSocket")
    }
}

impl EventReader {
    /// Reads the next event from the server. `Ok(None)` once the stream is closed.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        while let Some(msg) = self.read.next().await {
            match msg {
                Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(&text) {
                    Ok(event) => return Ok(Some(event)),
                    Err(e) => {
                        tracing::error!("Failed to deserialize server event: {}, text=> {:?}", e, text);
                    }
                },
                Ok(Message::Binary(_)) => {
                    tracing::warn!("Received unexpected binary message from Deepgram server.");
                }
                Ok(Message::Close(reason)) => {
                    tracing::info!("Deepgram WebSocket connection closed: {:?}", reason);
                    return Ok(None);
                }
                Err(e) => {
                    tracing::error!("Error reading from Deepgram WebSocket: {}", e);
                    return Err(e.into());
                }
                _ => { /* Ignore Ping/Pong */ }
            }
        }
        Ok(None)
    }
}
