//! HTTP surface
//!
//! ```text
//! POST /screenshots ──▶ RequestAggregator ──▶ Dispatcher
//! GET  /healthz, /health, /ready, /status ──▶ PipelineStats
//! ```

pub mod screenshots;
pub mod status;

use crate::pipeline::RequestAggregator;
use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub use screenshots::{
    error_response, screenshots_handler, ErrorResponse, ScreenshotItem, ScreenshotRequest,
    ScreenshotResponse,
};
pub use status::{status_router, HealthResponse, StatusResponse};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 1 << 20;

/// State shared by all handlers
pub struct AppState {
    /// Batch entry point
    pub aggregator: RequestAggregator,
    /// Capture workers, reported by `/status`
    pub worker_count: usize,
}

impl AppState {
    /// Create handler state
    pub fn new(aggregator: RequestAggregator, worker_count: usize) -> Self {
        Self {
            aggregator,
            worker_count,
        }
    }
}

/// Build the service router
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/screenshots", post(screenshots_handler))
        .merge(status_router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
