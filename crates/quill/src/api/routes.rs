//! API route definitions.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::ws;

use super::handlers;
use super::state::AppState;

/// Create the application router.
///
/// Every response carries permissive cross-origin headers; preflight is
/// handled by the CORS layer. Wrong-verb requests to a known path get 405
/// from method routing, unknown paths 404 from the fallback.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/history", get(handlers::get_history))
        .route("/clearHistory", post(handlers::clear_history))
        .route("/connect", get(ws::ws_handler))
        .with_state(state)
        .layer(cors)
        .layer(trace_layer)
}
