//! Canonical protocol types shared by the Quill server and client.
//!
//! Everything that crosses the wire is a closed, tagged union: unknown
//! shapes fail deserialization at the boundary instead of being probed
//! field-by-field.

mod messages;
mod wire;

pub use messages::{ChatMessage, Role};
pub use wire::{ClientCommand, ServerEvent};
