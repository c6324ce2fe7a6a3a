//! WebSocket side of the gateway.
//!
//! One logical connection per user key: the upgrade handler binds the new
//! socket to the key's session actor, replacing any previous binding. The
//! inbound loop parses client frames; the outbound pump drains the event
//! channel the actor writes to.

mod handler;

pub use handler::ws_handler;
