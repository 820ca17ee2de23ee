use crate::error::OracleError;
use crate::history::{ConversationHistory, Utterance};
use crate::oracle::{Mode, TurnOracle};
use crate::prompts::{Prompts, SceneDirective};
use std::sync::Arc;

/// Owns the conversation history and performs one oracle round trip at a time.
///
/// Every exchange borrows `self` mutably for its whole duration, so two
/// exchanges can never interleave their appends to the history.
pub struct TurnExchange<O: TurnOracle> {
    oracle: Arc<O>,
    prompts: Prompts,
    history: ConversationHistory,
    mode: Mode,
}

impl<O: TurnOracle> TurnExchange<O> {
    pub fn new(oracle: Arc<O>, prompts: Prompts, mode: Mode) -> Self {
        Self {
            oracle,
            prompts,
            history: ConversationHistory::new(),
            mode,
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Fetches the GM's opening line. Only the reply enters the history.
    pub async fn open(&mut self, mode: Mode) -> Result<String, OracleError> {
        self.mode = mode;
        let reply = self.oracle.open_session(mode).await.map_err(OracleError)?;
        self.history.push(Utterance::assistant(reply.clone()));
        Ok(reply)
    }

    /// Sends a player utterance. On failure the utterance stays in the history.
    pub async fn exchange(&mut self, content: &str) -> Result<String, OracleError> {
        self.history.push(Utterance::user(content));
        tracing::debug!("Turn {}: sending player message", self.history.len());
        let reply = self
            .oracle
            .respond(self.mode, self.history.as_slice())
            .await
            .map_err(OracleError)?;
        self.history.push(Utterance::assistant(reply.clone()));
        Ok(reply)
    }

    /// Sends a synthetic scene-boundary prompt after everything said so far.
    pub async fn exchange_directed(
        &mut self,
        directive: SceneDirective,
    ) -> Result<String, OracleError> {
        let prompt = self.prompts.directive(directive).to_string();
        tracing::debug!("Sending scene directive '{}'", directive.key());
        self.exchange(&prompt).await
    }

    /// Rolls the history back to `len` entries.
    pub(crate) fn rollback(&mut self, len: usize) {
        if len < self.history.len() {
            tracing::debug!(
                "Rolling history back from {} to {} entries",
                self.history.len(),
                len
            );
            self.history.truncate(len);
        }
    }
}
