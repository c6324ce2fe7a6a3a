//! Stream relay: raw backend chunks in, typed events out.
//!
//! The inference backend yields opaque text chunks, each possibly carrying
//! several newline-delimited lines in the `data: <payload>` framing. The
//! relay turns them into a typed event sequence. It holds no connection or
//! persistence state; its only memory is whether the terminal `Done` has
//! been emitted, which it guarantees to emit exactly once per stream.
//!
//! Lines that fail to parse are surfaced as `Token`s rather than dropped:
//! showing the user something beats strict validation here.

use serde_json::Value;

/// Line framing prefix used by the backend stream.
const DATA_PREFIX: &str = "data: ";

/// Completion sentinel payload.
const DONE_SENTINEL: &str = "[DONE]";

/// One typed event extracted from the backend stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// An incremental fragment of generated text.
    Token(String),
    /// Usage statistics; opaque, forwarded without interpretation.
    Usage(Value),
    /// A structured payload that is neither a delta nor usage.
    Data(String),
    /// Terminal: the stream completed.
    Done,
    /// Terminal: the stream failed. Produced by the session layer for
    /// backend errors, never by parsing.
    Error(String),
}

/// Stateless-but-for-termination parser over a single backend stream.
#[derive(Debug, Default)]
pub struct StreamRelay {
    done: bool,
}

impl StreamRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the terminal `Done` has been emitted.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Parse one raw chunk into events.
    ///
    /// A completion sentinel terminates the stream: the rest of the chunk is
    /// discarded and every later chunk parses to nothing.
    pub fn push_chunk(&mut self, chunk: &str) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }

        for line in chunk.split('\n') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            self.parse_line(line, &mut events);
            if self.done {
                break;
            }
        }

        events
    }

    /// Signal natural end of input. Emits the terminal `Done` unless an
    /// explicit sentinel already did.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.done {
            return None;
        }
        self.done = true;
        Some(StreamEvent::Done)
    }

    fn parse_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        let (framed, payload) = match line.strip_prefix(DATA_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, line),
        };

        if framed && payload == DONE_SENTINEL {
            self.done = true;
            events.push(StreamEvent::Done);
            return;
        }

        let Ok(parsed) = serde_json::from_str::<Value>(payload) else {
            // Unparseable payloads are shown rather than dropped.
            events.push(StreamEvent::Token(line.to_string()));
            return;
        };

        let mut classified = false;
        if let Some(usage) = parsed.get("usage") {
            events.push(StreamEvent::Usage(usage.clone()));
            classified = true;
        }
        if let Some(delta) = parsed.get("response").and_then(Value::as_str) {
            events.push(StreamEvent::Token(delta.to_string()));
            classified = true;
        }
        if !classified {
            events.push(StreamEvent::Data(payload.to_string()));
        }
    }
}
