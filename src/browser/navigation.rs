//! Page navigation functionality
//!
//! URL validation plus timeout-bounded navigation and readiness waits on a
//! chromiumoxide page. Retrying is left to the job pipeline.

use crate::browser::engine::RenderResult;
use crate::error::CaptureError;
use chromiumoxide::Page;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use url::Url;

/// Maximum accepted URL length
pub const MAX_URL_LENGTH: usize = 2048;

const ELEMENT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const DOM_CONTENT_LOADED_SCRIPT: &str = r#"
    new Promise(resolve => {
        if (document.readyState !== 'loading') {
            resolve(true);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(true));
        }
    })
"#;

/// URL validation utilities
pub struct UrlValidator;

impl UrlValidator {
    /// Validate a URL for navigation
    pub fn validate(url: &str) -> std::result::Result<Url, CaptureError> {
        if url.is_empty() {
            return Err(CaptureError::InvalidUrl("URL cannot be empty".to_string()));
        }

        if url.len() > MAX_URL_LENGTH {
            return Err(CaptureError::InvalidUrl(format!(
                "URL exceeds maximum length of {} characters",
                MAX_URL_LENGTH
            )));
        }

        let parsed = Url::parse(url).map_err(|e| CaptureError::InvalidUrl(format!("{url}: {e}")))?;

        match parsed.scheme() {
            "http" | "https" | "file" => Ok(parsed),
            other => Err(CaptureError::InvalidUrl(format!(
                "URL must start with http://, https://, or file:// (got {}://)",
                other
            ))),
        }
    }
}

/// Timeout-bounded navigation on a chromiumoxide page
pub struct PageNavigator;

impl PageNavigator {
    /// Navigate to a URL, failing after `timeout`
    #[instrument(skip(page))]
    pub async fn goto(page: &Page, url: &str, timeout: Duration) -> RenderResult<()> {
        info!("Navigating to: {}", url);

        tokio::time::timeout(timeout, page.goto(url))
            .await
            .map_err(|_| CaptureError::Timeout(timeout.as_millis() as u64))?
            .map_err(|e| CaptureError::Navigation(format!("{url}: {e}")))?;

        debug!("Navigation complete: {}", url);
        Ok(())
    }

    /// Wait for DOMContentLoaded, then poll until `selector` matches
    #[instrument(skip(page))]
    pub async fn wait_for_element(page: &Page, selector: &str, timeout: Duration) -> RenderResult<()> {
        let deadline = Instant::now() + timeout;
        let timed_out = || CaptureError::Timeout(timeout.as_millis() as u64);

        tokio::time::timeout_at(deadline, page.evaluate(DOM_CONTENT_LOADED_SCRIPT))
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| CaptureError::Evaluation(e.to_string()))?;

        loop {
            if page.find_element(selector).await.is_ok() {
                debug!("Element ready: {}", selector);
                return Ok(());
            }
            if Instant::now() + ELEMENT_POLL_INTERVAL > deadline {
                return Err(timed_out());
            }
            tokio::time::sleep(ELEMENT_POLL_INTERVAL).await;
        }
    }
}
