//! Terminal front end: parses typed lines and keeps enough of the session's
//! output around to turn "pick 2" into the right `Input`.

use session_zero_core::blocks::CharacterFieldMap;
use session_zero_core::oracle::Mode;
use session_zero_core::scene::{CharacterSheet, InMemoryCharacterSheet, Scene};
use session_zero_core::{Command, Input, MessageId, Status};

pub const HELP: &str = "\
  <Enter>         start / stop recording
  /start [quick]  start the session again after a failed start
  1, 2, 3         pick a suggested action
  /say TEXT       type instead of speaking
  /end            end the scene
  /finish         let the GM conclude the scene
  /accept         accept the proposed conclusion
  /retry          ask for a different conclusion
  /scenes         list finished scenes
  /scene N        show the log of scene N
  /sheet          show the character sheet
  /quit           leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ToggleRecording,
    /// `None` keeps the mode the client was launched with.
    Start(Option<Mode>),
    Say(String),
    Choose(usize),
    EndScene,
    FinishScene,
    Accept,
    Retry,
    ListScenes,
    ShowScene(u32),
    ShowSheet,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_line(line: &str) -> Action {
    let line = line.trim();
    if line.is_empty() {
        return Action::ToggleRecording;
    }
    if let Ok(number) = line.parse::<usize>() {
        return Action::Choose(number);
    }
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map(|(c, r)| (c, r.trim()))
        .unwrap_or((line, ""));
    match command {
        "/start" => Action::Start((!rest.is_empty()).then(|| rest.parse().unwrap_or_default())),
        "/say" if !rest.is_empty() => Action::Say(rest.to_string()),
        "/end" => Action::EndScene,
        "/finish" => Action::FinishScene,
        "/accept" => Action::Accept,
        "/retry" => Action::Retry,
        "/scenes" => Action::ListScenes,
        "/scene" => match rest.parse() {
            Ok(number) => Action::ShowScene(number),
            Err(_) => Action::Unknown(line.to_string()),
        },
        "/sheet" => Action::ShowSheet,
        "/help" | "?" => Action::Help,
        "/quit" | "/exit" => Action::Quit,
        _ => Action::Unknown(line.to_string()),
    }
}

/// What the terminal currently shows, rebuilt from the command stream.
#[derive(Debug, Default)]
pub struct View {
    choices: Option<(MessageId, usize)>,
    conclusion: Option<MessageId>,
    scenes: Vec<Scene>,
    sheet: InMemoryCharacterSheet,
    status: Option<Status>,
}

impl View {
    /// Folds one command into the view and returns the text to print, if any.
    pub fn apply(&mut self, command: &Command) -> Option<String> {
        match command {
            Command::Render(message) => {
                self.choices = (!message.choices.is_empty())
                    .then_some((message.id, message.choices.len()));
                self.conclusion = message.conclusion.then_some(message.id);

                let mut out = format!("\n{}: {}", message.speaker.label(), message.text);
                for (i, choice) in message.choices.iter().enumerate() {
                    out.push_str(&format!("\n  {}. {}", i + 1, choice));
                }
                if message.conclusion {
                    out.push_str("\n  (/accept to end the scene here, /retry for another ending)");
                }
                Some(out)
            }
            Command::Remove(id) => {
                if self.conclusion == Some(*id) {
                    self.conclusion = None;
                }
                Some("(previous ending discarded)".to_string())
            }
            Command::ClearConversation => {
                self.choices = None;
                self.conclusion = None;
                Some(format!("\n===== Scene {} =====", self.scenes.len() + 1))
            }
            Command::SceneArchived(scene) => {
                self.scenes.push(scene.clone());
                Some(format!("\nScene {} complete: {}", scene.number, scene.summary))
            }
            Command::CharacterUpdated(fields) => {
                self.sheet.apply(fields);
                Some(format!("Character sheet updated: {}", field_names(fields)))
            }
            Command::Status(status) => {
                if self.status.as_ref() == Some(status) {
                    return None;
                }
                self.status = Some(status.clone());
                if *status == Status::StartFailed {
                    return Some(format!("[{}] /start to try again", status));
                }
                Some(format!("[{}]", status))
            }
        }
    }

    /// `number` is the 1-based index shown next to the choice.
    pub fn choose(&self, number: usize) -> Option<Input> {
        let (message, count) = self.choices?;
        (1..=count).contains(&number).then_some(Input::SelectChoice {
            message,
            index: number - 1,
        })
    }

    pub fn accept(&self) -> Option<Input> {
        self.conclusion.map(Input::AcceptConclusion)
    }

    pub fn retry(&self) -> Option<Input> {
        self.conclusion.map(Input::RetryConclusion)
    }

    pub fn scene_list(&self) -> String {
        if self.scenes.is_empty() {
            return "No finished scenes yet.".to_string();
        }
        self.scenes
            .iter()
            .map(|scene| format!("  Scene {}: {}", scene.number, scene.summary))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn scene_log(&self, number: u32) -> Option<String> {
        let scene = self.scenes.iter().find(|scene| scene.number == number)?;
        let mut out = format!("===== Scene {} =====", scene.number);
        for message in &scene.messages {
            out.push_str(&format!("\n{}: {}", message.speaker.label(), message.content));
        }
        Some(out)
    }

    pub fn sheet_text(&self) -> String {
        if self.sheet.fields().is_empty() {
            return "The character sheet is empty.".to_string();
        }
        self.sheet
            .fields()
            .iter()
            .map(|(field, value)| format!("  {}: {}", field, value))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn field_names(fields: &CharacterFieldMap) -> String {
    fields.keys().cloned().collect::<Vec<_>>().join(", ")
}
