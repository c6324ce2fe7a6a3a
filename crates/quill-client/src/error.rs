//! Client-side error taxonomy.

use thiserror::Error;

/// Errors reported to the embedding application.
///
/// Local rejections (`NotConnected`, `Busy`) never touch the server; the
/// transport variants feed the reconnect path instead of crashing the
/// session task.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// An operation that needs a live socket was attempted without one.
    #[error("not connected")]
    NotConnected,

    /// A prompt was submitted while a turn is awaiting completion.
    #[error("a turn is awaiting completion")]
    Busy,

    /// No user key has been supplied yet.
    #[error("no user key: call connect first")]
    NoKey,

    /// The underlying socket or HTTP call failed.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The background session task is gone.
    #[error("client session closed")]
    Closed,
}
