//! Quill Server Library
//!
//! Core components of the streaming conversational relay: the HTTP/WebSocket
//! gateway, per-user session actors, the stream relay, the durable history
//! store, and the inference backend client.

pub mod api;
pub mod config;
pub mod db;
pub mod history;
pub mod inference;
pub mod relay;
pub mod session;
pub mod ws;
