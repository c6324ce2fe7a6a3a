//! HTTP request handlers.

use axum::{Json, extract::Query, extract::State};
use serde::Deserialize;
use serde_json::{Value, json};

use quill_protocol::ChatMessage;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Query parameters carrying the opaque user key.
#[derive(Debug, Deserialize)]
pub struct UserKeyQuery {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl UserKeyQuery {
    /// The user key, or 400 when absent — on every route.
    pub fn require(self) -> Result<String, ApiError> {
        self.user_id
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing userId query parameter"))
    }
}

/// Liveness probe.
///
/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": if state.db.is_healthy().await { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Fetch the persisted conversation for a user key.
///
/// GET /history?userId=<key>
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<UserKeyQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let key = query.require()?;
    let messages = state.sessions.session(&key).get_messages().await?;
    Ok(Json(messages))
}

/// Erase the persisted conversation for a user key. Idempotent.
///
/// POST /clearHistory?userId=<key>
pub async fn clear_history(
    State(state): State<AppState>,
    Query(query): Query<UserKeyQuery>,
) -> ApiResult<Json<Value>> {
    let key = query.require()?;
    state.sessions.session(&key).clear().await?;
    Ok(Json(json!({ "success": true })))
}
