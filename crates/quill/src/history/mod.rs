//! Durable per-user conversation history.
//!
//! The store is the only persistence surface in the server. Rows are
//! append-only per user key except for a full clear; insertion order is
//! chronological and authoritative. Consistency without locking comes from
//! the session layer: all writes for one key go through that key's actor.

mod repository;

pub use repository::HistoryStore;
