//! Per-user session actors.
//!
//! Every user key owns exactly one actor: a spawned task consuming a command
//! queue in arrival order. The queue is the serialization point for all
//! history mutation, so no locking is needed anywhere else. A history read
//! issued while a turn is streaming queues behind the turn and never
//! observes a half-written exchange.

mod actor;
mod error;
mod registry;

pub use actor::{SessionActor, SessionHandle};
pub use error::SessionError;
pub use registry::SessionRegistry;
