//! Capture orchestration
//!
//! One capture attempt is a short state machine run against a fresh
//! render session under a single hard deadline:
//!
//! ```text
//! Init ──▶ Navigating ──▶ WaitingReady ──▶ SectionLoop ──▶ Stitching ──▶ Done
//!   │           │               │               │              │
//!   └───────────┴───────────────┴───────┬───────┴──────────────┘
//!                                       ▼
//!                                     Failed
//! ```
//!
//! The session is closed whatever the outcome, including when the deadline
//! fires mid-step.

use crate::browser::engine::{RenderEngine, RenderSession, ViewportSize};
use crate::browser::navigation::UrlValidator;
use crate::capture::sections::{scroll_to_script, SectionCapture, SectionOptions, StallPolicy};
use crate::capture::stitch::{StitchedImage, Stitcher};
use crate::config::Config;
use crate::error::CaptureError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

/// Grace period for closing a session after the attempt ends
pub const SESSION_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// A single capture attempt: URL in, encoded image out
#[async_trait]
pub trait Capture: Send + Sync + 'static {
    /// Capture `url` once
    async fn capture(&self, url: &str) -> Result<Vec<u8>, CaptureError>;
}

/// Steps of one capture attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// Nothing started yet
    Init,
    /// Session open, loading the URL
    Navigating,
    /// Waiting for the DOM
    WaitingReady,
    /// Scrolling and clipping
    SectionLoop,
    /// Composing chunks
    Stitching,
    /// Image produced
    Done,
    /// Attempt failed
    Failed,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Init => "init",
            CaptureState::Navigating => "navigating",
            CaptureState::WaitingReady => "waiting-ready",
            CaptureState::SectionLoop => "section-loop",
            CaptureState::Stitching => "stitching",
            CaptureState::Done => "done",
            CaptureState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Options for capture attempts
#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Viewport requested from the engine
    pub viewport: ViewportSize,
    /// Hard deadline for the whole attempt
    pub timeout: Duration,
    /// Element whose presence marks the DOM as ready
    pub ready_selector: String,
    /// Wait after the initial scroll to top
    pub initial_settle: Duration,
    /// Section loop tuning
    pub sections: SectionOptions,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            viewport: ViewportSize::default(),
            timeout: Duration::from_secs(90),
            ready_selector: "body".to_string(),
            initial_settle: Duration::from_secs(2),
            sections: SectionOptions::default(),
        }
    }
}

impl CaptureOptions {
    /// Derive capture options from the service configuration
    pub fn from_config(config: &Config) -> Self {
        let viewport = ViewportSize {
            width: config.viewport_width,
            height: config.viewport_height,
        };
        Self {
            viewport,
            timeout: config.job_timeout(),
            initial_settle: config.settle_delay(),
            sections: SectionOptions {
                max_sections: config.max_sections,
                settle_delay: config.settle_delay(),
                stall_policy: StallPolicy::Fail,
                fallback_viewport: viewport,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// Runs capture attempts against a render engine
pub struct CaptureOrchestrator {
    engine: Arc<dyn RenderEngine>,
    options: CaptureOptions,
    sections: SectionCapture,
}

impl CaptureOrchestrator {
    /// Create an orchestrator over `engine`
    pub fn new(engine: Arc<dyn RenderEngine>, options: CaptureOptions) -> Self {
        let sections = SectionCapture::new(options.sections.clone());
        Self {
            engine,
            options,
            sections,
        }
    }

    /// The options in use
    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    /// Capture `url` into a stitched image
    #[instrument(skip(self), fields(timeout_ms = self.options.timeout.as_millis() as u64))]
    pub async fn capture_url(&self, url: &str) -> Result<StitchedImage, CaptureError> {
        UrlValidator::validate(url)?;

        let started = Instant::now();
        let deadline = started + self.options.timeout;
        let timeout_ms = self.options.timeout.as_millis() as u64;
        info!("Capture start for {}", url);

        let session = match timeout_at(deadline, self.engine.open_session(self.options.viewport)).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                warn!(state = %CaptureState::Init, error = %e, "Capture failed");
                return Err(e);
            }
            Err(_) => return Err(CaptureError::Timeout(timeout_ms)),
        };

        let mut state = CaptureState::Init;
        let outcome = timeout_at(deadline, self.drive(session.as_ref(), url, &mut state)).await;

        match timeout(SESSION_CLOSE_GRACE, session.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Failed to close render session: {}", e),
            Err(_) => warn!("Render session did not close within {:?}", SESSION_CLOSE_GRACE),
        }

        let result = match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(state = %state, "Capture deadline exceeded");
                Err(CaptureError::Timeout(timeout_ms))
            }
        };

        match &result {
            Ok(image) => {
                transition(&mut state, CaptureState::Done);
                info!(
                    "Capture complete for {} ({}x{}, {} bytes, {:?})",
                    url,
                    image.width,
                    image.height,
                    image.png.len(),
                    started.elapsed()
                );
            }
            Err(e) => {
                let failed_in = state;
                transition(&mut state, CaptureState::Failed);
                warn!(state = %failed_in, error = %e, "Capture failed");
            }
        }
        result
    }

    async fn drive(
        &self,
        session: &dyn RenderSession,
        url: &str,
        state: &mut CaptureState,
    ) -> Result<StitchedImage, CaptureError> {
        transition(state, CaptureState::Navigating);
        session.navigate(url).await?;

        transition(state, CaptureState::WaitingReady);
        session.wait_for_element(&self.options.ready_selector).await?;
        session
            .evaluate(&scroll_to_script(0.0))
            .await
            .map_err(|e| CaptureError::Evaluation(format!("prepare viewport: {e}")))?;
        if !self.options.initial_settle.is_zero() {
            tokio::time::sleep(self.options.initial_settle).await;
        }

        transition(state, CaptureState::SectionLoop);
        let captured = self.sections.run(session).await?;

        transition(state, CaptureState::Stitching);
        let chunks = captured.chunks;
        tokio::task::spawn_blocking(move || Stitcher::stitch(&chunks))
            .await
            .map_err(|e| CaptureError::Encoding(format!("stitch task failed: {e}")))?
    }
}

fn transition(state: &mut CaptureState, next: CaptureState) {
    debug!("capture state {} -> {}", state, next);
    *state = next;
}

#[async_trait]
impl Capture for CaptureOrchestrator {
    async fn capture(&self, url: &str) -> Result<Vec<u8>, CaptureError> {
        self.capture_url(url).await.map(|image| image.png)
    }
}
