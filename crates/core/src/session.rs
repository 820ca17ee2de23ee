use crate::blocks::{self, ParsedResponse};
use crate::history::{ConversationHistory, Speaker};
use crate::oracle::{Mode, TurnOracle};
use crate::prompts::{Prompts, SceneDirective};
use crate::scene::{self, CharacterSheet, SceneArchive, SceneBuffer};
use crate::turn::TurnExchange;
use crate::{Command, Input, MessageId, RenderedMessage, Status};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

// --- Session State ---

/// A proposed conclusion waiting for accept or retry.
///
/// The lengths are taken before the finish directive was sent, so a retry can
/// cut both the history and the scene buffer back to exactly that point.
#[derive(Debug, Clone, Copy)]
struct PendingConclusion {
    message: MessageId,
    history_len: usize,
    buffer_len: usize,
}

/// Owns everything a running session mutates: history, the current scene and
/// the archive. Driven by [`GameSession::run`] on a single task, so inputs
/// that arrive while an oracle call is in flight wait their turn.
pub struct GameSession<O: TurnOracle, S: CharacterSheet> {
    turns: TurnExchange<O>,
    started: watch::Sender<bool>,
    scene: SceneBuffer,
    archive: SceneArchive,
    sheet: S,
    command_tx: mpsc::Sender<Command>,
    next_message: u64,
    choices: Option<(MessageId, Vec<String>)>,
    conclusion: Option<PendingConclusion>,
}

impl<O: TurnOracle, S: CharacterSheet> GameSession<O, S> {
    pub fn new(
        oracle: Arc<O>,
        prompts: Prompts,
        sheet: S,
        command_tx: mpsc::Sender<Command>,
    ) -> Self {
        let (started, _) = watch::channel(false);
        Self {
            turns: TurnExchange::new(oracle, prompts, Mode::default()),
            started,
            scene: SceneBuffer::new(1),
            archive: SceneArchive::default(),
            sheet,
            command_tx,
            next_message: 0,
            choices: None,
            conclusion: None,
        }
    }

    /// Flips to `true` once the opening turn has been rendered.
    pub fn session_started(&self) -> watch::Receiver<bool> {
        self.started.subscribe()
    }

    pub fn is_started(&self) -> bool {
        *self.started.borrow()
    }

    pub fn history(&self) -> &ConversationHistory {
        self.turns.history()
    }

    pub fn scene(&self) -> &SceneBuffer {
        &self.scene
    }

    pub fn archive(&self) -> &SceneArchive {
        &self.archive
    }

    pub fn sheet(&self) -> &S {
        &self.sheet
    }

    /// Consumes inputs until the channel closes, then hands the session back.
    pub async fn run(mut self, mut input_rx: mpsc::Receiver<Input>) -> Self {
        while let Some(input) = input_rx.recv().await {
            self.handle(input).await;
        }
        tracing::info!("Session input closed after scene {}", self.scene.number());
        self
    }

    pub async fn handle(&mut self, input: Input) {
        tracing::debug!("Handling {:?}", input);
        if !self.is_started() && !matches!(input, Input::StartSession(_)) {
            tracing::warn!("Session not started, ignoring {:?}", input);
            return;
        }
        match input {
            Input::StartSession(mode) => self.start(mode).await,
            Input::PlayerUtterance(text) => self.player_turn(&text).await,
            Input::SelectChoice { message, index } => self.select_choice(message, index).await,
            Input::EndScene => self.end_scene().await,
            Input::FinishScene => self.finish_scene_for_me().await,
            Input::AcceptConclusion(message) => self.accept_conclusion(message).await,
            Input::RetryConclusion(message) => self.retry_conclusion(message).await,
        }
    }

    // --- Operations ---

    pub async fn start(&mut self, mode: Mode) {
        if self.is_started() {
            tracing::warn!("Session already started, ignoring start");
            return;
        }
        tracing::info!("Starting session in {} mode", mode);
        self.notify(Command::Status(Status::Starting)).await;

        match self.turns.open(mode).await {
            Ok(reply) => {
                let parsed = blocks::parse(&reply);
                self.render_gm(parsed).await;
                self.started.send_replace(true);
                self.notify(Command::Status(Status::Ready)).await;
            }
            Err(e) => {
                tracing::error!("Failed to start session: {}", e);
                self.notify(Command::Status(Status::StartFailed)).await;
            }
        }
    }

    pub async fn player_turn(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        // Whatever was on offer is superseded by the player speaking.
        self.choices = None;
        self.conclusion = None;

        self.render(Speaker::Player, text.to_string(), Vec::new(), false)
            .await;
        self.notify(Command::Status(Status::Processing)).await;

        match self.turns.exchange(text).await {
            Ok(reply) => {
                self.render_gm(blocks::parse(&reply)).await;
                self.notify(Command::Status(Status::Ready)).await;
            }
            Err(e) => {
                tracing::error!("{}", e);
                self.notify(Command::Status(Status::ResponseFailed)).await;
            }
        }
    }

    /// Plays the chosen suggestion exactly as if the player had said it.
    pub async fn select_choice(&mut self, message: MessageId, index: usize) {
        let label = match &self.choices {
            Some((offered_by, labels)) if *offered_by == message => labels.get(index).cloned(),
            _ => {
                tracing::warn!("Ignoring choice for stale message {}", message);
                return;
            }
        };
        match label {
            Some(label) => self.player_turn(&label).await,
            None => tracing::warn!("Message {} has no choice {}", message, index + 1),
        }
    }

    pub async fn end_scene(&mut self) {
        if self.scene.is_empty() {
            tracing::info!("Scene {} is empty, nothing to end", self.scene.number());
            return;
        }
        self.choices = None;
        self.conclusion = None;
        self.notify(Command::Status(Status::EndingScene)).await;

        let reply = match self.turns.exchange_directed(SceneDirective::EndScene).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!("Failed to end scene {}: {}", self.scene.number(), e);
                self.notify(Command::Status(Status::EndSceneFailed)).await;
                return;
            }
        };
        let parsed = blocks::parse(&reply);

        if let Some(updates) = &parsed.character_updates {
            tracing::info!("Applying {} character field(s)", updates.len());
            self.sheet.apply(updates);
            self.notify(Command::CharacterUpdated(updates.clone())).await;
        }

        let summary = scene::summarize(&parsed.narrative);
        let finished = std::mem::replace(&mut self.scene, SceneBuffer::new(0));
        let (archived, next) = finished.archive(summary);
        self.scene = next;
        tracing::info!(
            "Archived scene {} ({} messages)",
            archived.number,
            archived.messages.len()
        );
        self.archive.push(archived.clone());
        self.notify(Command::SceneArchived(archived)).await;
        self.notify(Command::ClearConversation).await;

        // The transition text opens the new scene.
        self.render_gm(parsed).await;
        self.notify(Command::Status(Status::Ready)).await;
    }

    pub async fn finish_scene_for_me(&mut self) {
        if self.scene.is_empty() {
            tracing::info!("Scene {} is empty, nothing to finish", self.scene.number());
            return;
        }
        self.choices = None;
        self.conclusion = None;
        let history_len = self.turns.history().len();
        let buffer_len = self.scene.len();
        self.request_conclusion(SceneDirective::FinishScene, history_len, buffer_len)
            .await;
    }

    pub async fn accept_conclusion(&mut self, message: MessageId) {
        if !self.is_current_conclusion(message) {
            tracing::warn!("Ignoring accept for stale conclusion {}", message);
            return;
        }
        self.end_scene().await;
    }

    /// Discards the offered conclusion everywhere it was recorded and asks for another.
    pub async fn retry_conclusion(&mut self, message: MessageId) {
        let Some(pending) = self.conclusion.take().filter(|c| c.message == message) else {
            tracing::warn!("Ignoring retry for stale conclusion {}", message);
            return;
        };
        tracing::info!("Retrying conclusion {}", message);
        self.turns.rollback(pending.history_len);
        self.scene.truncate(pending.buffer_len);
        self.notify(Command::Remove(message)).await;

        self.request_conclusion(
            SceneDirective::RetryEnding,
            pending.history_len,
            pending.buffer_len,
        )
        .await;
    }

    async fn request_conclusion(
        &mut self,
        directive: SceneDirective,
        history_len: usize,
        buffer_len: usize,
    ) {
        self.notify(Command::Status(Status::Processing)).await;
        match self.turns.exchange_directed(directive).await {
            Ok(reply) => {
                // Conclusions carry no choices even if the GM offered some.
                let narrative = blocks::parse(&reply).narrative;
                let message = self.render(Speaker::Gm, narrative, Vec::new(), true).await;
                self.conclusion = Some(PendingConclusion {
                    message,
                    history_len,
                    buffer_len,
                });
                self.notify(Command::Status(Status::Ready)).await;
            }
            Err(e) => {
                tracing::error!("Failed to conclude scene {}: {}", self.scene.number(), e);
                self.notify(Command::Status(Status::ResponseFailed)).await;
            }
        }
    }

    fn is_current_conclusion(&self, message: MessageId) -> bool {
        self.conclusion.is_some_and(|c| c.message == message)
    }

    // --- Rendering ---

    async fn render_gm(&mut self, parsed: ParsedResponse) {
        let ParsedResponse {
            narrative, choices, ..
        } = parsed;
        let message = self
            .render(Speaker::Gm, narrative, choices.clone(), false)
            .await;
        self.choices = (!choices.is_empty()).then_some((message, choices));
    }

    /// Shows a message and records it in the current scene.
    async fn render(
        &mut self,
        speaker: Speaker,
        text: String,
        choices: Vec<String>,
        conclusion: bool,
    ) -> MessageId {
        self.next_message += 1;
        let id = MessageId(self.next_message);
        self.scene.push(speaker, text.clone());
        self.notify(Command::Render(RenderedMessage {
            id,
            speaker,
            text,
            choices,
            conclusion,
        }))
        .await;
        id
    }

    async fn notify(&self, command: Command) {
        if let Err(e) = self.command_tx.send(command).await {
            tracing::warn!("Failed to send command to runtime: {:?}", e.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{Role, Utterance};
    use crate::oracle::MockTurnOracle;
    use crate::scene::InMemoryCharacterSheet;
    use mockall::Sequence;

    type TestSession = GameSession<MockTurnOracle, InMemoryCharacterSheet>;

    fn session(oracle: MockTurnOracle) -> (TestSession, mpsc::Receiver<Command>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let session = GameSession::new(
            Arc::new(oracle),
            Prompts::default(),
            InMemoryCharacterSheet::default(),
            command_tx,
        );
        (session, command_rx)
    }

    fn drain(rx: &mut mpsc::Receiver<Command>) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(command) = rx.try_recv() {
            out.push(command);
        }
        out
    }

    fn rendered(commands: &[Command]) -> Vec<RenderedMessage> {
        commands
            .iter()
            .filter_map(|c| match c {
                Command::Render(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn opening(oracle: &mut MockTurnOracle, reply: &'static str) {
        oracle
            .expect_open_session()
            .times(1)
            .returning(move |_| Ok(reply.to_string()));
    }

    #[tokio::test]
    async fn quick_start_offers_choices_and_selection_plays_one_turn() {
        let mut oracle = MockTurnOracle::new();
        oracle
            .expect_open_session()
            .withf(|mode| *mode == Mode::Quick)
            .times(1)
            .returning(|_| {
                Ok("You wake in a cell. [CHOICES]\n1. Call out\n2. Stay silent\n[/CHOICES]"
                    .to_string())
            });
        oracle
            .expect_respond()
            .withf(|_, messages| messages.last() == Some(&Utterance::user("Call out")))
            .times(1)
            .returning(|_, _| Ok("A guard shuffles over.".to_string()));

        let (mut session, mut rx) = session(oracle);
        session.handle(Input::StartSession(Mode::Quick)).await;

        let opening = rendered(&drain(&mut rx)).remove(0);
        assert_eq!(opening.text, "You wake in a cell.");
        assert_eq!(opening.choices, vec!["Call out", "Stay silent"]);
        assert!(session.is_started());

        session
            .handle(Input::SelectChoice {
                message: opening.id,
                index: 0,
            })
            .await;

        let history = session.history().as_slice();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].role, Role::User);
        assert_eq!(history[1].content, "Call out");
        assert_eq!(history[2], Utterance::assistant("A guard shuffles over."));
        assert_eq!(session.scene().len(), 3);
    }

    #[tokio::test]
    async fn stale_choice_is_ignored() {
        let mut oracle = MockTurnOracle::new();
        opening(&mut oracle, "Two doors. [CHOICES]\n1. Left\n2. Right\n[/CHOICES]");
        oracle
            .expect_respond()
            .times(1)
            .returning(|_, _| Ok("The corridor bends.".to_string()));

        let (mut session, mut rx) = session(oracle);
        session.start(Mode::Normal).await;
        let first = rendered(&drain(&mut rx)).remove(0);

        session.player_turn("I wait").await;
        // The first message's choices were superseded by the player's own turn.
        session.select_choice(first.id, 1).await;

        assert_eq!(session.history().len(), 3);
        assert!(rendered(&drain(&mut rx))
            .iter()
            .all(|m| m.text != "Right"));
    }

    #[tokio::test]
    async fn inputs_before_start_are_ignored() {
        let (mut session, mut rx) = session(MockTurnOracle::new());
        let started = session.session_started();

        session.handle(Input::PlayerUtterance("Hello".to_string())).await;
        session.handle(Input::EndScene).await;

        assert!(!*started.borrow());
        assert!(session.history().is_empty());
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn failed_start_can_be_retried() {
        let mut oracle = MockTurnOracle::new();
        let mut seq = Sequence::new();
        oracle
            .expect_open_session()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(anyhow::anyhow!("timeout")));
        oracle
            .expect_open_session()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("Welcome, traveller.".to_string()));

        let (mut session, mut rx) = session(oracle);
        session.start(Mode::Normal).await;
        assert!(!session.is_started());
        assert!(drain(&mut rx).contains(&Command::Status(Status::StartFailed)));

        session.start(Mode::Normal).await;
        assert!(session.is_started());
        assert_eq!(
            session.history().as_slice(),
            &[Utterance::assistant("Welcome, traveller.")]
        );
    }

    #[tokio::test]
    async fn failed_turn_keeps_player_message_and_reports() {
        let mut oracle = MockTurnOracle::new();
        opening(&mut oracle, "You stand at a crossroads.");
        oracle
            .expect_respond()
            .times(1)
            .returning(|_, _| Err(anyhow::anyhow!("503")));

        let (mut session, mut rx) = session(oracle);
        session.start(Mode::Normal).await;
        session.player_turn("I go north").await;

        assert_eq!(session.history().last(), Some(&Utterance::user("I go north")));
        let commands = drain(&mut rx);
        assert_eq!(
            commands.last(),
            Some(&Command::Status(Status::ResponseFailed))
        );
    }

    #[tokio::test]
    async fn end_scene_archives_summary_and_applies_character_fields() {
        let mut oracle = MockTurnOracle::new();
        opening(&mut oracle, "You wake in a cell.");
        let mut seq = Sequence::new();
        oracle
            .expect_respond()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("The guard hesitates.".to_string()));
        oracle
            .expect_respond()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| {
                Ok(concat!(
                    "You talked your way out! The guard let you go. Dawn breaks.\n",
                    "[CHARACTER]\nName: Kira\nFears: [unknown]\nBonds: the guard\n[/CHARACTER]\n",
                    "[CHOICES]\n1. Head to town\n2. Rest\n[/CHOICES]"
                )
                .to_string())
            });

        let (mut session, mut rx) = session(oracle);
        session.start(Mode::Normal).await;
        session.player_turn("Please, let me out").await;
        drain(&mut rx);

        session.end_scene().await;

        let archived = &session.archive().scenes()[0];
        assert_eq!(archived.number, 1);
        assert_eq!(archived.messages.len(), 3);
        assert_eq!(archived.messages[1].speaker, Speaker::Player);
        assert_eq!(
            archived.summary,
            "You talked your way out. The guard let you go."
        );
        assert_eq!(session.sheet().get("name"), Some("Kira"));
        assert_eq!(session.sheet().get("bonds"), Some("the guard"));
        assert_eq!(session.sheet().get("fears"), None);

        assert_eq!(session.scene().number(), 2);
        assert_eq!(session.scene().len(), 1);
        let commands = drain(&mut rx);
        let clear_at = commands
            .iter()
            .position(|c| *c == Command::ClearConversation)
            .unwrap();
        let opening = rendered(&commands[clear_at..]).remove(0);
        assert_eq!(
            opening.text,
            "You talked your way out! The guard let you go. Dawn breaks."
        );
        assert_eq!(opening.choices, vec!["Head to town", "Rest"]);
    }

    #[tokio::test]
    async fn ending_an_empty_scene_is_a_no_op() {
        let mut oracle = MockTurnOracle::new();
        opening(&mut oracle, "Scene one.");
        oracle
            .expect_respond()
            .times(1)
            .returning(|_, _| Ok("Scene one ends. Scene two begins.".to_string()));

        let (mut session, mut rx) = session(oracle);
        session.start(Mode::Normal).await;
        session.end_scene().await;
        assert_eq!(session.archive().len(), 1);

        // Force an empty buffer for the new scene and try again.
        session.scene.truncate(0);
        drain(&mut rx);
        session.end_scene().await;
        session.finish_scene_for_me().await;

        assert_eq!(session.archive().len(), 1);
        assert_eq!(session.scene().number(), 2);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn retry_discards_exactly_the_previous_conclusion() {
        let mut oracle = MockTurnOracle::new();
        opening(&mut oracle, "The duel begins.");
        let mut seq = Sequence::new();
        oracle
            .expect_respond()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("You win the duel.".to_string()));
        oracle
            .expect_respond()
            .withf(|_, messages| {
                messages.len() == 2 && messages.iter().all(|m| m.content != "You win the duel.")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("You yield with honour.".to_string()));

        let (mut session, mut rx) = session(oracle);
        session.start(Mode::Normal).await;
        drain(&mut rx);
        let history_before = session.history().len();
        let buffer_before = session.scene().len();

        session.handle(Input::FinishScene).await;
        assert_eq!(session.history().len(), history_before + 2);
        assert_eq!(session.scene().len(), buffer_before + 1);
        let first = rendered(&drain(&mut rx)).remove(0);
        assert!(first.conclusion);

        session.handle(Input::RetryConclusion(first.id)).await;

        let commands = drain(&mut rx);
        assert_eq!(commands[0], Command::Remove(first.id));
        let second = rendered(&commands).remove(0);
        assert!(second.conclusion);
        assert_eq!(second.text, "You yield with honour.");

        assert_eq!(session.history().len(), history_before + 2);
        assert_eq!(session.scene().len(), buffer_before + 1);
        assert!(session
            .history()
            .as_slice()
            .iter()
            .all(|u| u.content != "You win the duel."));
        assert_eq!(
            session.scene().messages().last().map(|m| m.content.as_str()),
            Some("You yield with honour.")
        );

        // The discarded conclusion can no longer be retried or accepted.
        session.handle(Input::RetryConclusion(first.id)).await;
        session.handle(Input::AcceptConclusion(first.id)).await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn accepting_a_conclusion_ends_the_scene() {
        let mut oracle = MockTurnOracle::new();
        opening(&mut oracle, "The storm rolls in.");
        let mut seq = Sequence::new();
        oracle
            .expect_respond()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("You reach shelter.".to_string()));
        oracle
            .expect_respond()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok("The storm passes. Morning comes.".to_string()));

        let (mut session, mut rx) = session(oracle);
        session.start(Mode::Normal).await;
        drain(&mut rx);
        session.finish_scene_for_me().await;
        let conclusion = rendered(&drain(&mut rx)).remove(0);

        session.accept_conclusion(conclusion.id).await;

        let archived = &session.archive().scenes()[0];
        assert_eq!(archived.messages.len(), 2);
        assert_eq!(archived.messages[1].content, "You reach shelter.");
        assert_eq!(archived.summary, "The storm passes. Morning comes.");
    }

    #[tokio::test]
    async fn run_processes_queued_inputs_in_order() {
        let mut oracle = MockTurnOracle::new();
        opening(&mut oracle, "Begin.");
        oracle
            .expect_respond()
            .times(2)
            .returning(|_, messages| Ok(format!("Reply {}", messages.len())));

        let (session, _rx) = session(oracle);
        let (input_tx, input_rx) = mpsc::channel(8);
        input_tx.send(Input::StartSession(Mode::Normal)).await.unwrap();
        input_tx
            .send(Input::PlayerUtterance("one".to_string()))
            .await
            .unwrap();
        input_tx
            .send(Input::PlayerUtterance("two".to_string()))
            .await
            .unwrap();
        drop(input_tx);

        let session = session.run(input_rx).await;
        let contents: Vec<&str> = session
            .history()
            .as_slice()
            .iter()
            .map(|u| u.content.as_str())
            .collect();
        assert_eq!(contents, vec!["Begin.", "one", "Reply 2", "two", "Reply 4"]);
    }
}
