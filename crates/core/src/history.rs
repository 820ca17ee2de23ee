use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One role-tagged message exchanged with the turn oracle. Never edited once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    pub role: Role,
    pub content: String,
}

impl Utterance {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The ordered conversation sent to the oracle. It outlives scenes.
#[derive(Debug, Default, Clone)]
pub struct ConversationHistory {
    utterances: Vec<Utterance>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, utterance: Utterance) {
        self.utterances.push(utterance);
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn as_slice(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn last(&self) -> Option<&Utterance> {
        self.utterances.last()
    }

    /// Drops everything appended after `len` entries. Only the retry flow rolls history back.
    pub(crate) fn truncate(&mut self, len: usize) {
        self.utterances.truncate(len);
    }
}

/// Who is speaking in the scene view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Gm,
    Player,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Gm => "Dungeon Master",
            Speaker::Player => "You",
        }
    }
}

/// Narrative-only projection of an utterance, kept for the scene archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneMessage {
    pub speaker: Speaker,
    pub content: String,
}
