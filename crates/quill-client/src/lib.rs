//! Quill Client Library
//!
//! The native counterpart to the Quill server: a connection state machine
//! with fixed-backoff reconnection, local prompt gating, and reassembly of
//! streamed tokens into a display transcript.

mod error;
mod session;
mod transcript;
mod transport;

pub use error::ClientError;
pub use session::{
    ClientConfig, ClientEvent, ClientHandle, ClientSession, ConnectionState, SessionSnapshot,
};
pub use transcript::Transcript;
pub use transport::{Transport, TransportStreams, WsTransport};
