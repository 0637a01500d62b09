//! HTTP API for the broadcast pipeline.
//!
//! This crate contains the axum routes for:
//! - Broadcast management (start, run worker, status, history, details, retry)
//! - Test notifications and click tracking
//! - The recipient directory
//! - Real-time events (SSE streaming)

mod broadcasts;
mod error;
mod extract;
mod health;
mod notifications;
mod realtime;
mod recipients;
mod state;

use axum::Router;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use extract::{ApiJson, ApiQuery};
pub use realtime::sse_event;
pub use state::AppState;

/// Create the application router with all routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(broadcasts::router())
        .merge(notifications::router())
        .merge(recipients::router())
        .merge(realtime::router())
        .merge(health::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
