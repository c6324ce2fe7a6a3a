//! Application state shared across handlers.

use std::sync::Arc;

use crate::db::Database;
use crate::history::HistoryStore;
use crate::inference::InferenceBackend;
use crate::session::SessionRegistry;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session registry resolving user keys to their actors.
    pub sessions: Arc<SessionRegistry>,
    /// Database handle (health checks).
    pub db: Database,
}

impl AppState {
    /// Create new application state.
    pub fn new(db: Database, backend: Arc<dyn InferenceBackend>) -> Self {
        let store = HistoryStore::new(db.clone());
        Self {
            sessions: Arc::new(SessionRegistry::new(store, backend)),
            db,
        }
    }
}
