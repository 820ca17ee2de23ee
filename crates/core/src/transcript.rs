//! Folding streamed recognition events into one player utterance.

/// One partial or final transcription pushed by the recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionEvent {
    pub text: String,
    pub is_final: bool,
    /// Arrival order on the channel. The only ordering signal we trust.
    pub sequence: u64,
}

impl RecognitionEvent {
    pub fn partial(text: impl Into<String>, sequence: u64) -> Self {
        Self {
            text: text.into(),
            is_final: false,
            sequence,
        }
    }

    pub fn final_(text: impl Into<String>, sequence: u64) -> Self {
        Self {
            text: text.into(),
            is_final: true,
            sequence,
        }
    }
}

/// Outcome of reconciling one recording span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    Utterance(String),
    /// No speech was recognised.
    Empty,
}

/// Running transcript state for a single push-to-talk gesture.
///
/// A fresh span is built for every recording and consumed by [`RecordingSpan::finalize`],
/// so nothing leaks from one gesture into the next.
#[derive(Debug, Default)]
pub struct RecordingSpan {
    accumulated_final_text: String,
    last_partial_text: String,
    events_seen: usize,
}

impl RecordingSpan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &RecognitionEvent) {
        // Providers routinely emit empty results; they must not clear a pending partial.
        if event.text.is_empty() {
            return;
        }
        self.events_seen += 1;
        if event.is_final {
            self.accumulated_final_text.push_str(&event.text);
            self.accumulated_final_text.push(' ');
            self.last_partial_text.clear();
        } else {
            // Partials are full re-transcriptions of the open segment, not deltas.
            self.last_partial_text.clear();
            self.last_partial_text.push_str(&event.text);
        }
    }

    pub fn events_seen(&self) -> usize {
        self.events_seen
    }

    /// Finals win outright; the last partial is only a fallback when no final text exists.
    pub fn finalize(self) -> Reconciled {
        let finals = self.accumulated_final_text.trim();
        let transcript = if finals.is_empty() {
            self.last_partial_text.trim()
        } else {
            finals
        };
        if transcript.is_empty() {
            Reconciled::Empty
        } else {
            Reconciled::Utterance(transcript.to_string())
        }
    }
}

/// Reconciles an ordered sequence of events in one pass.
pub fn reconcile<'a, I>(events: I) -> Reconciled
where
    I: IntoIterator<Item = &'a RecognitionEvent>,
{
    let mut span = RecordingSpan::new();
    for event in events {
        span.apply(event);
    }
    span.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utterance(text: &str) -> Reconciled {
        Reconciled::Utterance(text.to_string())
    }

    #[test]
    fn finals_are_joined_in_arrival_order_ignoring_partials() {
        let events = vec![
            RecognitionEvent::partial("I open", 0),
            RecognitionEvent::partial("I open the", 1),
            RecognitionEvent::final_("I open the door.", 2),
            RecognitionEvent::partial("Then I", 3),
            RecognitionEvent::final_("Then I step inside.", 4),
            RecognitionEvent::partial("and", 5),
        ];
        assert_eq!(
            reconcile(&events),
            utterance("I open the door. Then I step inside.")
        );
    }

    #[test]
    fn last_partial_is_the_fallback_when_no_final_arrives() {
        let events = vec![
            RecognitionEvent::partial("hello", 0),
            RecognitionEvent::partial("hello there", 1),
            RecognitionEvent::partial("  hello there friend ", 2),
        ];
        assert_eq!(reconcile(&events), utterance("hello there friend"));
    }

    #[test]
    fn partial_after_final_is_never_merged() {
        let events = vec![
            RecognitionEvent::final_("Call out.", 0),
            RecognitionEvent::partial("Call out loudly", 1),
        ];
        assert_eq!(reconcile(&events), utterance("Call out."));
    }

    #[test]
    fn duplicate_finals_are_kept_verbatim() {
        let events = vec![
            RecognitionEvent::final_("yes", 0),
            RecognitionEvent::final_("yes", 1),
        ];
        assert_eq!(reconcile(&events), utterance("yes yes"));
    }

    #[test]
    fn empty_inputs_reconcile_to_empty() {
        assert_eq!(reconcile(&Vec::new()), Reconciled::Empty);

        let blanks = vec![
            RecognitionEvent::partial("", 0),
            RecognitionEvent::final_("", 1),
        ];
        assert_eq!(reconcile(&blanks), Reconciled::Empty);

        let whitespace = vec![RecognitionEvent::final_("   ", 0)];
        assert_eq!(reconcile(&whitespace), Reconciled::Empty);
    }

    #[test]
    fn empty_final_does_not_discard_pending_partial() {
        let mut span = RecordingSpan::new();
        span.apply(&RecognitionEvent::partial("wait for me", 0));
        span.apply(&RecognitionEvent::final_("", 1));
        assert_eq!(span.events_seen(), 1);
        assert_eq!(span.finalize(), utterance("wait for me"));
    }
}
