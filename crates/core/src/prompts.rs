use crate::oracle::Mode;
use std::collections::HashMap;

/// Synthetic player-side prompts that steer the GM at scene boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneDirective {
    /// Summarise, offer new scenes and emit the character block.
    EndScene,
    /// Write a short conclusion with no choices.
    FinishScene,
    /// Write a different conclusion after the player rejected one.
    RetryEnding,
}

impl SceneDirective {
    pub fn key(&self) -> &'static str {
        match self {
            SceneDirective::EndScene => "end_scene",
            SceneDirective::FinishScene => "finish_scene",
            SceneDirective::RetryEnding => "retry_ending",
        }
    }
}

/// The full prompt set, keyed by file stem.
///
/// Defaults are compiled in; a directory of `*.md` files can override any of
/// them by using the same stem (see `prompt_loader` in the client service).
#[derive(Debug, Clone)]
pub struct Prompts {
    prompts: HashMap<String, String>,
}

const DEFAULTS: [(&str, &str); 7] = [
    ("gm_normal", include_str!("../prompts/gm_normal.md")),
    ("gm_quick", include_str!("../prompts/gm_quick.md")),
    ("opening_normal", include_str!("../prompts/opening_normal.md")),
    ("opening_quick", include_str!("../prompts/opening_quick.md")),
    ("end_scene", include_str!("../prompts/end_scene.md")),
    ("finish_scene", include_str!("../prompts/finish_scene.md")),
    ("retry_ending", include_str!("../prompts/retry_ending.md")),
];

impl Default for Prompts {
    fn default() -> Self {
        Self {
            prompts: DEFAULTS
                .iter()
                .map(|(key, text)| (key.to_string(), text.to_string()))
                .collect(),
        }
    }
}

impl Prompts {
    /// Replaces defaults with any prompt sharing its key. Unknown keys are kept but unused.
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        for (key, text) in overrides {
            if !self.prompts.contains_key(&key) {
                tracing::warn!("Prompt '{}' does not replace any built-in prompt", key);
            }
            self.prompts.insert(key, text);
        }
        self
    }

    fn get(&self, key: &str) -> &str {
        self.prompts.get(key).map(|s| s.trim()).unwrap_or_default()
    }

    pub fn system(&self, mode: Mode) -> &str {
        match mode {
            Mode::Normal => self.get("gm_normal"),
            Mode::Quick => self.get("gm_quick"),
        }
    }

    /// The user line that opens a session with no history.
    pub fn opening(&self, mode: Mode) -> &str {
        match mode {
            Mode::Normal => self.get("opening_normal"),
            Mode::Quick => self.get("opening_quick"),
        }
    }

    pub fn directive(&self, directive: SceneDirective) -> &str {
        self.get(directive.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_mode_and_directive() {
        let prompts = Prompts::default();
        assert!(prompts.system(Mode::Normal).contains("[CHOICES]"));
        assert!(prompts.system(Mode::Quick).contains("QUICK START"));
        assert_eq!(prompts.opening(Mode::Quick), "Begin the scene.");
        assert_eq!(
            prompts.opening(Mode::Normal),
            "I'm ready to begin my Session Zero."
        );
        assert!(prompts.directive(SceneDirective::EndScene).contains("[CHARACTER]"));
        assert!(!prompts.directive(SceneDirective::FinishScene).is_empty());
        assert!(!prompts.directive(SceneDirective::RetryEnding).is_empty());
    }

    #[test]
    fn overrides_replace_matching_keys() {
        let overrides = HashMap::from([("opening_quick".to_string(), "Go.\n".to_string())]);
        let prompts = Prompts::default().with_overrides(overrides);
        assert_eq!(prompts.opening(Mode::Quick), "Go.");
        assert_eq!(
            prompts.opening(Mode::Normal),
            "I'm ready to begin my Session Zero."
        );
    }
}
