//! `POST /screenshots`
//!
//! Accepts `{"urls": [...]}` and answers `{"results": [...]}` with one
//! entry per URL in request order, each carrying either a base64 PNG or
//! an error string. Failures of single URLs never fail the request.

use crate::error::{Error, InputError, RequestError};
use crate::handlers::AppState;
use crate::pipeline::JobResult;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Request body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScreenshotRequest {
    /// URLs to capture
    #[serde(default)]
    pub urls: Vec<String>,
}

/// One URL's outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotItem {
    /// Requested URL
    pub url: String,
    /// Base64 PNG
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Why no image was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<JobResult> for ScreenshotItem {
    fn from(result: JobResult) -> Self {
        let (image, error) = match result.outcome {
            Ok(png) if png.is_empty() => (None, Some("no image data returned".to_string())),
            Ok(png) => (Some(base64::engine::general_purpose::STANDARD.encode(png)), None),
            Err(e) => (None, Some(e.to_string())),
        };
        Self {
            url: result.url,
            image,
            error,
        }
    }
}

/// Response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotResponse {
    /// Outcomes in request order
    pub results: Vec<ScreenshotItem>,
}

/// Body of a failed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What went wrong
    pub error: String,
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

/// Map a whole-request failure to its HTTP response
pub fn error_response(err: Error) -> Response {
    match err {
        Error::Input(e) => error_body(StatusCode::BAD_REQUEST, e.to_string()),
        Error::Request(e @ RequestError::DeadlineExceeded { .. }) => {
            error_body(StatusCode::GATEWAY_TIMEOUT, e.to_string())
        }
        Error::Request(e @ RequestError::Dispatch(_)) => {
            error_body(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        other => error_body(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    }
}

/// Capture a batch of URLs
#[instrument(skip_all)]
pub async fn screenshots_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ScreenshotRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!("Rejected screenshot request: {}", rejection.body_text());
            return error_response(InputError::MalformedPayload(rejection.body_text()).into());
        }
    };

    let started = Instant::now();
    let count = request.urls.len();
    match state.aggregator.capture_batch(request.urls).await {
        Ok(results) => {
            let results: Vec<ScreenshotItem> = results.into_iter().map(ScreenshotItem::from).collect();
            info!("Served {} screenshots in {:?}", count, started.elapsed());
            (StatusCode::OK, Json(ScreenshotResponse { results })).into_response()
        }
        Err(e) => {
            warn!("Screenshot request failed: {}", e);
            error_response(e)
        }
    }
}
