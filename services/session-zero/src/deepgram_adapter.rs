use anyhow::{Context, Result};
use async_trait::async_trait;
use deepgram_realtime::types::{ResultsEvent, ServerEvent};
use secrecy::{ExposeSecret, SecretString};
use session_zero_core::recorder::{ChannelInput, RecognitionStream, Transcriber};
use session_zero_core::transcript::RecognitionEvent;
use session_zero_native_utils::audio::RECOGNITION_PCM16_SAMPLE_RATE;
use tokio::sync::mpsc;

/// An adapter that implements the core `Transcriber` trait on top of a Deepgram live stream.
///
/// Every `open` is a fresh websocket; nothing is shared between recording spans.
pub struct DeepgramTranscriber {
    api_key: SecretString,
}

impl DeepgramTranscriber {
    pub fn new(api_key: SecretString) -> Self {
        Self { api_key }
    }
}

/// Numbers results in arrival order and drops those without text.
fn to_recognition(results: &ResultsEvent, sequence: &mut u64) -> Option<RecognitionEvent> {
    let text = results.transcript()?;
    let event = RecognitionEvent {
        text: text.to_string(),
        is_final: results.is_final,
        sequence: *sequence,
    };
    *sequence += 1;
    Some(event)
}

#[async_trait]
impl Transcriber for DeepgramTranscriber {
    async fn open(&self) -> Result<RecognitionStream> {
        let config = deepgram_realtime::Config::builder(SecretString::from(
            self.api_key.expose_secret().to_string(),
        ))
        .with_sample_rate(RECOGNITION_PCM16_SAMPLE_RATE as u32)
        .build();
        let (mut writer, mut reader) = deepgram_realtime::connect(&config)
            .await
            .context("Failed to open Deepgram stream")?;

        let (audio_tx, mut audio_rx) = mpsc::channel::<ChannelInput>(64);
        let (events_tx, events_rx) = mpsc::channel::<RecognitionEvent>(64);

        // Outbound: audio frames, then CloseStream. Dropping the sender closes the socket.
        tokio::spawn(async move {
            while let Some(input) = audio_rx.recv().await {
                match input {
                    ChannelInput::Audio(frame) => {
                        if let Err(e) = writer.send_audio(&frame).await {
                            tracing::error!("Stopping audio upload: {:?}", e);
                            break;
                        }
                    }
                    ChannelInput::EndOfStream => {
                        if let Err(e) = writer.close_stream().await {
                            tracing::warn!("Failed to close Deepgram stream: {:?}", e);
                        }
                    }
                }
            }
            if let Err(e) = writer.close().await {
                tracing::debug!("Deepgram socket already closed: {:?}", e);
            }
            tracing::debug!("Deepgram upload finished");
        });

        // Inbound: results become recognition events until the server closes.
        tokio::spawn(async move {
            let mut sequence = 0;
            loop {
                match reader.next_event().await {
                    Ok(Some(ServerEvent::Results(results))) => {
                        let Some(event) = to_recognition(&results, &mut sequence) else {
                            continue;
                        };
                        tracing::debug!(
                            "Transcript {} ({}): {}",
                            event.sequence,
                            if event.is_final { "final" } else { "partial" },
                            event.text
                        );
                        if events_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Ok(Some(other)) => tracing::debug!("Ignoring Deepgram event: {:?}", other),
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!("Deepgram stream failed: {:?}", e);
                        break;
                    }
                }
            }
        });

        Ok(RecognitionStream {
            audio: audio_tx,
            events: events_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn results(json: &str) -> ResultsEvent {
        match serde_json::from_str::<ServerEvent>(json).unwrap() {
            ServerEvent::Results(results) => results,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn sequence_counts_only_events_with_text() {
        let mut sequence = 0;
        let partial = results(
            r#"{"type":"Results","is_final":false,"channel":{"alternatives":[{"transcript":"I look"}]}}"#,
        );
        let silence = results(
            r#"{"type":"Results","is_final":true,"channel":{"alternatives":[{"transcript":""}]}}"#,
        );
        let final_ = results(
            r#"{"type":"Results","is_final":true,"channel":{"alternatives":[{"transcript":"I look around."}]}}"#,
        );

        assert_eq!(
            to_recognition(&partial, &mut sequence),
            Some(RecognitionEvent::partial("I look", 0))
        );
        assert_eq!(to_recognition(&silence, &mut sequence), None);
        assert_eq!(
            to_recognition(&final_, &mut sequence),
            Some(RecognitionEvent::final_("I look around.", 1))
        );
    }
}
