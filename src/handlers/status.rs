//! Status and health check handlers
//!
//! This module provides HTTP endpoints for monitoring the service:
//! - `/healthz` - Plain-text liveness probe
//! - `/health` - JSON liveness probe
//! - `/ready` - Readiness, 503 once the dispatcher stopped accepting jobs
//! - `/status` - Pipeline counters, latency and process memory
//!
//! # Architecture
//!
//! ```text
//! HTTP Request ──> Axum Router ──> status_handler ──> AppState
//!                                        │                │
//!                                        ▼                ▼
//!                              StatusResponse      PipelineStats
//!                                        │      (counters + latency)
//!                                        ▼
//!                                   JSON Response
//! ```
//!
//! # Example Response
//!
//! ```json
//! {
//!   "version": "0.1.0",
//!   "name": "fafosnap",
//!   "uptime_seconds": 3600,
//!   "workers": 2,
//!   "queue_depth": 0,
//!   "accepting_jobs": true,
//!   "pipeline": {
//!     "jobs_submitted": 120,
//!     "jobs_in_flight": 2,
//!     "captures_succeeded": 110,
//!     "captures_failed": 8,
//!     "attempts": 131,
//!     "retries": 11,
//!     "latency": { "p50_ms": 6100, "p95_ms": 14200, "p99_ms": 30500, "mean_ms": 7012.4, "max_ms": 90012, "samples": 131 }
//!   },
//!   "memory": { "rss_bytes": 52428800, "virtual_bytes": 268435456 },
//!   "status": "running",
//!   "timestamp": "2026-01-01T12:00:00+00:00"
//! }
//! ```

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, instrument};

use crate::handlers::AppState;
use crate::pipeline::StatsSnapshot;

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Response Types
// ============================================================================

/// Health check response for simple liveness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status
    pub status: String,
}

impl HealthResponse {
    fn with_status(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self::with_status("healthy")
    }
}

/// Detailed service status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server version (from Cargo.toml)
    pub version: String,

    /// Server name
    pub name: String,

    /// Seconds since the pipeline started
    pub uptime_seconds: u64,

    /// Capture workers
    pub workers: usize,

    /// Jobs waiting in the queue
    pub queue_depth: usize,

    /// Whether new batches are accepted
    pub accepting_jobs: bool,

    /// Pipeline counters
    pub pipeline: StatsSnapshot,

    /// Memory usage metrics
    pub memory: MemoryMetrics,

    /// Server status
    pub status: String,

    /// RFC 3339 timestamp of when status was generated
    pub timestamp: String,
}

/// Memory usage metrics collected from sysinfo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Resident Set Size (bytes)
    pub rss_bytes: u64,

    /// Virtual memory size (bytes)
    pub virtual_bytes: u64,
}

// ============================================================================
// System Metrics Collection
// ============================================================================

/// Collect memory metrics for the current process.
///
/// Returns zeros if the process cannot be found.
fn collect_memory_metrics() -> MemoryMetrics {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match system.process(pid) {
        Some(process) => MemoryMetrics {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        },
        None => {
            debug!("Could not find current process in sysinfo");
            MemoryMetrics::default()
        }
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// `GET /healthz`: plain `ok`
pub async fn healthz_handler() -> &'static str {
    "ok"
}

/// `GET /health`: `{"status": "healthy"}` while the process is up
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    debug!("Health check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// `GET /status`: counters, latency percentiles and memory
#[instrument(skip_all)]
pub async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Status check requested");

    let handle = state.aggregator.handle();
    let stats = handle.stats();
    let accepting_jobs = !handle.is_closed();

    let response = StatusResponse {
        version: SERVER_VERSION.to_string(),
        name: SERVER_NAME.to_string(),
        uptime_seconds: stats.uptime_seconds(),
        workers: state.worker_count,
        queue_depth: handle.queue_depth(),
        accepting_jobs,
        pipeline: stats.snapshot(),
        memory: collect_memory_metrics(),
        status: if accepting_jobs { "running" } else { "draining" }.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

/// `GET /ready`: 200 while jobs are accepted, 503 once the dispatcher is
/// closed. The server closes it as soon as a shutdown signal arrives, so
/// connections still open during the graceful drain see "draining".
#[instrument(skip_all)]
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Readiness check requested");
    if state.aggregator.handle().is_closed() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse::with_status("draining")),
        )
    } else {
        (StatusCode::OK, Json(HealthResponse::with_status("ready")))
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Routes for the health and status endpoints
pub fn status_router() -> axum::Router<Arc<AppState>> {
    use axum::routing::get;

    axum::Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ready", get(readiness_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_default() {
        assert_eq!(HealthResponse::default().status, "healthy");
    }

    #[test]
    fn test_memory_metrics_default() {
        let metrics = MemoryMetrics::default();
        assert_eq!(metrics.rss_bytes, 0);
        assert_eq!(metrics.virtual_bytes, 0);
    }

    #[test]
    fn test_collect_memory_metrics() {
        let metrics = collect_memory_metrics();
        assert!(metrics.rss_bytes > 0);
    }

    #[test]
    fn test_status_response_serialization() {
        let response = StatusResponse {
            version: "0.1.0".to_string(),
            name: "fafosnap".to_string(),
            uptime_seconds: 3600,
            workers: 2,
            queue_depth: 0,
            accepting_jobs: true,
            pipeline: StatsSnapshot::default(),
            memory: MemoryMetrics::default(),
            status: "running".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        };

        let json = serde_json::to_string(&response).expect("Failed to serialize");
        assert!(json.contains("\"uptime_seconds\":3600"));
        assert!(json.contains("\"captures_succeeded\":0"));
        assert!(json.contains("\"status\":\"running\""));
    }

    #[test]
    fn test_server_constants() {
        assert!(!SERVER_VERSION.is_empty());
        assert_eq!(SERVER_NAME, "fafosnap");
    }

    #[tokio::test]
    async fn test_healthz_handler() {
        assert_eq!(healthz_handler().await, "ok");
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
