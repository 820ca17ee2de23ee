use crate::blocks::CharacterFieldMap;
use crate::history::{SceneMessage, Speaker};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An archived scene. Built once, when the scene ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    pub number: u32,
    pub messages: Vec<SceneMessage>,
    pub summary: String,
}

/// Messages of the scene currently being played.
#[derive(Debug, Clone)]
pub struct SceneBuffer {
    number: u32,
    messages: Vec<SceneMessage>,
}

impl SceneBuffer {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            messages: Vec::new(),
        }
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn push(&mut self, speaker: Speaker, content: impl Into<String>) {
        self.messages.push(SceneMessage {
            speaker,
            content: content.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[SceneMessage] {
        &self.messages
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    /// Consumes this buffer into an archived scene and returns the buffer for the next one.
    pub fn archive(self, summary: String) -> (Scene, SceneBuffer) {
        let next = SceneBuffer::new(self.number + 1);
        let scene = Scene {
            number: self.number,
            messages: self.messages,
            summary,
        };
        (scene, next)
    }
}

/// Append-only list of finished scenes, ordered by number.
#[derive(Debug, Default, Clone)]
pub struct SceneArchive {
    scenes: Vec<Scene>,
}

impl SceneArchive {
    pub fn push(&mut self, scene: Scene) {
        debug_assert!(self.scenes.last().is_none_or(|last| last.number < scene.number));
        self.scenes.push(scene);
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn get(&self, number: u32) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.number == number)
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

/// First two sentences of the narrative, joined with ". " and closed with a period.
///
/// A narrative with no sentences summarizes to a lone ".".
pub fn summarize(narrative: &str) -> String {
    let sentences: Vec<&str> = narrative
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .take(2)
        .collect();
    format!("{}.", sentences.join(". "))
}

/// The longer-lived character sheet that scene endings feed into.
pub trait CharacterSheet: Send {
    fn apply(&mut self, updates: &CharacterFieldMap);
}

pub const FIELD_SEPARATOR: &str = "; ";

/// Keeps the sheet in memory for the lifetime of the process.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct InMemoryCharacterSheet {
    fields: BTreeMap<String, String>,
}

impl InMemoryCharacterSheet {
    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

impl CharacterSheet for InMemoryCharacterSheet {
    fn apply(&mut self, updates: &CharacterFieldMap) {
        for (field, value) in updates {
            let entry = self.fields.entry(field.clone()).or_default();
            if entry.is_empty() {
                entry.push_str(value);
            } else {
                entry.push_str(FIELD_SEPARATOR);
                entry.push_str(value);
            }
        }
    }
}
