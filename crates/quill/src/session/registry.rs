//! Sharded registry mapping user keys to their session actors.

use std::sync::Arc;

use dashmap::DashMap;
use log::info;

use crate::history::HistoryStore;
use crate::inference::InferenceBackend;

use super::actor::{SessionActor, SessionHandle};

/// Registry resolving an opaque user key to its single session actor.
///
/// The same key always resolves to the same live actor; actors are spawned
/// lazily on first use and run for the life of the process. Different keys
/// are fully independent.
pub struct SessionRegistry {
    sessions: DashMap<String, SessionHandle>,
    store: HistoryStore,
    backend: Arc<dyn InferenceBackend>,
}

impl SessionRegistry {
    pub fn new(store: HistoryStore, backend: Arc<dyn InferenceBackend>) -> Self {
        Self {
            sessions: DashMap::new(),
            store,
            backend,
        }
    }

    /// Resolve `user_id` to its actor handle, spawning the actor on first use.
    pub fn session(&self, user_id: &str) -> SessionHandle {
        self.sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                info!("spawning session actor for key {user_id}");
                SessionActor::spawn(
                    user_id.to_string(),
                    self.store.clone(),
                    Arc::clone(&self.backend),
                )
            })
            .clone()
    }

    /// Number of live session actors (for diagnostics).
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
