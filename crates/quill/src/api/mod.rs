//! HTTP gateway: routing, handlers, shared state, and the error surface.

mod error;
mod handlers;
mod routes;
mod state;

pub use error::{ApiError, ApiResult};
pub use handlers::UserKeyQuery;
pub use routes::create_router;
pub use state::AppState;
