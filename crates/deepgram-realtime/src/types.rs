use serde::{Deserialize, Serialize};

// Outgoing messages

/// Control messages. Audio itself goes out as binary frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
    /// Flush pending audio, send the remaining results, then close.
    CloseStream,
}

// Incoming messages

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    Results(ResultsEvent),
    Metadata(MetadataEvent),
    UtteranceEnd(UtteranceEndEvent),
    SpeechStarted(SpeechStartedEvent),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResultsEvent {
    #[serde(default)]
    pub is_final: bool,
    #[serde(default)]
    pub speech_final: bool,
    #[serde(default)]
    pub start: f64,
    #[serde(default)]
    pub duration: f64,
    pub channel: Option<Channel>,
}

impl ResultsEvent {
    /// The top alternative's transcript, if it has any text.
    pub fn transcript(&self) -> Option<&str> {
        self.channel
            .as_ref()?
            .alternatives
            .first()
            .map(|alt| alt.transcript.as_str())
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alternative {
    #[serde(default)]
    pub transcript: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataEvent {
    pub request_id: Option<String>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UtteranceEndEvent {
    pub last_word_end: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechStartedEvent {
    pub timestamp: Option<f64>,
}
