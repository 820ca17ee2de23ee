use crate::history::Utterance;
use anyhow::Result;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on the length of one GM reply.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Selects the GM system prompt for the whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The GM first asks about the character concept.
    #[default]
    Normal,
    /// The GM drops the player straight into a scene.
    Quick,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Quick => "quick",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = std::convert::Infallible;

    /// Anything other than "quick" is a normal session.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.eq_ignore_ascii_case("quick") {
            Mode::Quick
        } else {
            Mode::Normal
        })
    }
}

/// The narrative backend: full ordered history in, one GM reply out.
///
/// Implementations exist for the Anthropic Messages API and for the HTTP proxy
/// in `services/api`; tests use the generated `MockTurnOracle`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TurnOracle: Send + Sync {
    /// `messages` ends with the new user message.
    async fn respond(&self, mode: Mode, messages: &[Utterance]) -> Result<String>;

    /// The GM's opening line for a fresh session with no history.
    async fn open_session(&self, mode: Mode) -> Result<String>;
}
