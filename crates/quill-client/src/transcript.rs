//! Display transcript with in-place token reassembly.

use chrono::Utc;
use quill_protocol::{ChatMessage, Role};

/// The messages a UI should render, plus the reassembly state for the
/// assistant entry currently being streamed.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<ChatMessage>,
    streaming: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the transcript with persisted history.
    pub fn seed(&mut self, history: Vec<ChatMessage>) {
        self.entries = history;
        self.streaming = false;
    }

    /// Echo a just-sent prompt.
    pub fn push_user(&mut self, content: &str) {
        self.entries.push(ChatMessage::new(
            Role::User,
            content,
            Utc::now().timestamp_millis(),
        ));
    }

    /// Apply one token delta.
    ///
    /// The first delta of a turn creates a new assistant entry; every
    /// following delta extends that same entry in place.
    pub fn push_token(&mut self, delta: &str) {
        if self.streaming {
            if let Some(last) = self.entries.last_mut() {
                last.content.push_str(delta);
                return;
            }
        }
        self.entries.push(ChatMessage::new(
            Role::Assistant,
            delta,
            Utc::now().timestamp_millis(),
        ));
        self.streaming = true;
    }

    /// End the current turn: the next token starts a new entry.
    pub fn finish_turn(&mut self) {
        self.streaming = false;
    }

    /// Drop everything (local mirror of a history clear).
    pub fn clear(&mut self) {
        self.entries.clear();
        self.streaming = false;
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_reassemble_in_place() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");
        transcript.push_token("Hel");
        transcript.push_token("lo");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.entries()[1].role, Role::Assistant);
        assert_eq!(transcript.entries()[1].content, "Hello");
    }

    #[test]
    fn test_next_turn_starts_new_entry() {
        let mut transcript = Transcript::new();
        transcript.push_token("first");
        transcript.finish_turn();
        transcript.push_token("second");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.entries()[0].content, "first");
        assert_eq!(transcript.entries()[1].content, "second");
    }

    #[test]
    fn test_seed_resets_streaming_state() {
        let mut transcript = Transcript::new();
        transcript.push_token("partial");
        transcript.seed(vec![ChatMessage::new(Role::User, "old", 1)]);
        transcript.push_token("fresh");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.entries()[1].content, "fresh");
    }
}
