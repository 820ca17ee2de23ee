pub mod anthropic;
pub mod blocks;
pub mod error;
pub mod history;
pub mod oracle;
pub mod prompts;
pub mod proxy;
pub mod recorder;
pub mod scene;
pub mod session;
pub mod transcript;
pub mod turn;

use crate::blocks::CharacterFieldMap;
use crate::history::Speaker;
use crate::oracle::Mode;
use crate::scene::Scene;
use std::fmt;

/// Identifies one rendered message for the lifetime of a session.
///
/// Choices and scene conclusions are addressed by the id of the message that
/// offered them, so an action aimed at a message that is no longer current can
/// be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A message as the runtime should display it. Structured blocks are already stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub id: MessageId,
    pub speaker: Speaker,
    pub text: String,
    /// Selectable suggestions offered with this message, in order.
    pub choices: Vec<String>,
    /// True when this is a proposed scene conclusion awaiting accept/retry.
    pub conclusion: bool,
}

/// User-visible status line.
#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Starting,
    Ready,
    Listening,
    Processing,
    EndingScene,
    NoSpeech,
    CaptureDenied,
    StartFailed,
    ResponseFailed,
    EndSceneFailed,
}

impl Status {
    /// Whether the runtime should fall back to `Ready` after a short delay.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Status::NoSpeech | Status::ResponseFailed | Status::EndSceneFailed
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Status::Starting => "Starting session...",
            Status::Ready => "Ready - Hold to speak",
            Status::Listening => "Listening...",
            Status::Processing => "Processing...",
            Status::EndingScene => "Ending scene...",
            Status::NoSpeech => "No speech detected - try again",
            Status::CaptureDenied => "Microphone access denied",
            Status::StartFailed => "Error starting session",
            Status::ResponseFailed => "Error getting response",
            Status::EndSceneFailed => "Error ending scene",
        };
        f.write_str(text)
    }
}

/// Represents commands that the core logic issues to the runtime.
///
/// The core never touches a terminal or a window; it describes what should be
/// shown and the runtime decides how.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Render(RenderedMessage),
    /// Take a previously rendered message off the display.
    Remove(MessageId),
    /// The conversation view starts over for a new scene.
    ClearConversation,
    SceneArchived(Scene),
    CharacterUpdated(CharacterFieldMap),
    Status(Status),
}

/// Inputs the session actor consumes, one at a time, from its channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    StartSession(Mode),
    /// A finalized utterance from a recording span, or typed text.
    PlayerUtterance(String),
    SelectChoice { message: MessageId, index: usize },
    EndScene,
    FinishScene,
    AcceptConclusion(MessageId),
    RetryConclusion(MessageId),
}
