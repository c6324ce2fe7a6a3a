//! Session-level error taxonomy.
//!
//! All of these are recovered at the session boundary and reported to the
//! client as `error` events; none of them terminate the actor.

use thiserror::Error;

/// Errors surfaced to a connected client during session operation.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A prompt arrived while a turn was already streaming. The prompt is
    /// rejected, not queued.
    #[error("a turn is already in progress")]
    Busy,

    /// The inference backend failed before or during a turn.
    #[error("inference backend failure: {0}")]
    Backend(String),

    /// An inbound frame did not parse as a known command.
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}
