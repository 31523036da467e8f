//! Sectioned page capture
//!
//! A single viewport cannot show a whole page, and lazily loaded pages only
//! grow once they are scrolled. [`SectionCapture`] walks the document from
//! top to bottom: read a fresh [`ScrollSnapshot`], clip-capture one
//! viewport-high slice at the device scale, scroll, let the page settle,
//! repeat. The loop is bounded by `max_sections` and by stall detection so
//! pathological pages always terminate.

use crate::browser::engine::{ClipRegion, RenderSession, ViewportSize};
use crate::error::CaptureError;
use image::RgbaImage;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Reads scroll position and document/viewport dimensions
pub const SCROLL_SNAPSHOT_SCRIPT: &str = r#"({
    scrollY: window.scrollY || document.documentElement.scrollTop || 0,
    scrollHeight: Math.max(document.body.scrollHeight, document.documentElement.scrollHeight),
    scrollWidth: Math.max(document.body.scrollWidth, document.documentElement.scrollWidth),
    innerHeight: window.innerHeight,
    innerWidth: window.innerWidth,
    dpr: window.devicePixelRatio || 1
})"#;

/// Script scrolling the window to `y`
pub fn scroll_to_script(y: f64) -> String {
    format!("window.scrollTo(0, {})", y)
}

/// Point-in-time read of the page's scroll state
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScrollSnapshot {
    /// Current vertical scroll offset
    #[serde(rename = "scrollY")]
    pub scroll_y: f64,
    /// Full document height
    #[serde(rename = "scrollHeight")]
    pub scroll_height: f64,
    /// Full document width
    #[serde(rename = "scrollWidth")]
    pub scroll_width: f64,
    /// Viewport height
    #[serde(rename = "innerHeight")]
    pub viewport_height: f64,
    /// Viewport width
    #[serde(rename = "innerWidth")]
    pub viewport_width: f64,
    /// Device pixels per CSS pixel
    #[serde(rename = "dpr", default = "default_dpr")]
    pub device_pixel_ratio: f64,
}

fn default_dpr() -> f64 {
    1.0
}

impl ScrollSnapshot {
    /// Whether the viewport reaches the end of the document
    pub fn covers_document(&self) -> bool {
        self.scroll_y + self.viewport_height >= self.scroll_height - 1.0
    }

    /// Scale to capture at, never below 1
    pub fn capture_scale(&self) -> f64 {
        self.device_pixel_ratio.max(1.0)
    }
}

/// One captured slice, positioned in the stitched output
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Offset of the slice's first row in the stitched image
    pub vertical_offset: u32,
    /// Normalised RGBA pixels
    pub pixels: RgbaImage,
}

impl Chunk {
    /// Width in device pixels
    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    /// Height in device pixels
    pub fn height(&self) -> u32 {
        self.pixels.height()
    }
}

/// What to do when scrolling stops moving before the page is covered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StallPolicy {
    /// Fail the attempt with [`CaptureError::ScrollStalled`]
    #[default]
    Fail,
    /// Keep the sections captured so far
    AcceptPartial,
}

/// Tuning for the section loop
#[derive(Debug, Clone)]
pub struct SectionOptions {
    /// Hard cap on loop iterations
    pub max_sections: usize,
    /// Wait after each scroll for lazy content
    pub settle_delay: Duration,
    /// Scroll movement below this is no progress
    pub stall_epsilon: f64,
    /// Consecutive stalls before the stall policy applies
    pub max_stalls: u32,
    /// Stall handling
    pub stall_policy: StallPolicy,
    /// Used when the page reports a non-positive viewport or width
    pub fallback_viewport: ViewportSize,
}

impl Default for SectionOptions {
    fn default() -> Self {
        Self {
            max_sections: 500,
            settle_delay: Duration::from_secs(2),
            stall_epsilon: 0.5,
            max_stalls: 3,
            stall_policy: StallPolicy::Fail,
            fallback_viewport: ViewportSize::default(),
        }
    }
}

/// Ordered chunks of one page plus the bookkeeping the stitcher needs
#[derive(Debug)]
pub struct CapturedSections {
    /// Chunks in capture order
    pub chunks: Vec<Chunk>,
    /// Sum of chunk heights
    pub total_height: u32,
    /// Widest chunk
    pub max_width: u32,
    /// Document height at the last snapshot
    pub last_scroll_height: f64,
    /// Loop iterations performed
    pub iterations: usize,
}

/// Drives one render session through the scroll-and-clip loop
#[derive(Debug, Clone, Default)]
pub struct SectionCapture {
    options: SectionOptions,
}

impl SectionCapture {
    /// Create a section capture with `options`
    pub fn new(options: SectionOptions) -> Self {
        Self { options }
    }

    /// The options in use
    pub fn options(&self) -> &SectionOptions {
        &self.options
    }

    /// Capture the page currently loaded in `session`
    #[instrument(skip_all)]
    pub async fn run(&self, session: &dyn RenderSession) -> Result<CapturedSections, CaptureError> {
        let opts = &self.options;
        let mut chunks: Vec<Chunk> = Vec::with_capacity(12);
        let mut total_height: u32 = 0;
        let mut max_width: u32 = 0;
        let mut prev_scroll: Option<f64> = None;
        let mut pending_scroll = 0.0;
        let mut stalls: u32 = 0;
        let mut last_scroll_height = 0.0;
        let mut iterations = 0;
        let mut finished = false;

        for section in 0..opts.max_sections {
            iterations += 1;
            let state = read_snapshot(session).await?;
            last_scroll_height = state.scroll_height;

            if section == 0 && state.scroll_height <= 0.0 {
                return Err(CaptureError::ZeroHeightPage);
            }

            if let Some(prev) = prev_scroll {
                if (state.scroll_y - prev).abs() < opts.stall_epsilon {
                    if state.covers_document() {
                        debug!("No further scroll progress at y={:.2}, page covered", state.scroll_y);
                        finished = true;
                        break;
                    }

                    stalls += 1;
                    warn!(
                        scroll_y = state.scroll_y,
                        scroll_height = state.scroll_height,
                        stalls,
                        "Scroll made no progress"
                    );
                    if stalls >= opts.max_stalls {
                        match opts.stall_policy {
                            StallPolicy::Fail => {
                                return Err(CaptureError::ScrollStalled {
                                    scroll_y: state.scroll_y,
                                    scroll_height: state.scroll_height,
                                    stalls,
                                });
                            }
                            StallPolicy::AcceptPartial => {
                                warn!("Keeping {} sections of a stalled page", chunks.len());
                                finished = true;
                                break;
                            }
                        }
                    }

                    self.scroll_and_settle(session, pending_scroll).await?;
                    continue;
                }
            }
            stalls = 0;
            prev_scroll = Some(state.scroll_y);

            let viewport_height = if state.viewport_height > 0.0 {
                state.viewport_height
            } else {
                opts.fallback_viewport.height as f64
            };
            let capture_height = viewport_height.min(state.scroll_height - state.scroll_y);
            if capture_height < 1.0 {
                finished = true;
                break;
            }

            let width = if state.scroll_width > 0.0 {
                state.scroll_width
            } else {
                opts.fallback_viewport.width as f64
            };

            debug!(
                "section {}: scrollY={:.0} height={:.0}/{:.0}",
                section + 1,
                state.scroll_y,
                capture_height,
                state.scroll_height
            );

            let clip = ClipRegion {
                x: 0.0,
                y: state.scroll_y,
                width,
                height: capture_height,
                scale: state.capture_scale(),
            };
            let data = session
                .capture_clip(clip)
                .await
                .map_err(|e| CaptureError::SectionCapture {
                    section: section + 1,
                    reason: e.to_string(),
                })?;

            let pixels = image::load_from_memory(&data)
                .map_err(|e| CaptureError::SectionDecode {
                    section: section + 1,
                    reason: e.to_string(),
                })?
                .to_rgba8();

            let chunk = Chunk {
                vertical_offset: total_height,
                pixels,
            };
            total_height += chunk.height();
            max_width = max_width.max(chunk.width());
            chunks.push(chunk);

            if state.scroll_height - (state.scroll_y + capture_height) <= 1.0 {
                finished = true;
                break;
            }

            pending_scroll = (state.scroll_y + capture_height).min(state.scroll_height);
            self.scroll_and_settle(session, pending_scroll).await?;
        }

        if !finished {
            warn!("Section limit of {} reached", opts.max_sections);
        }

        if chunks.is_empty() {
            return Err(CaptureError::NoChunksCaptured);
        }

        Ok(CapturedSections {
            chunks,
            total_height,
            max_width,
            last_scroll_height,
            iterations,
        })
    }

    async fn scroll_and_settle(&self, session: &dyn RenderSession, y: f64) -> Result<(), CaptureError> {
        session
            .evaluate(&scroll_to_script(y))
            .await
            .map_err(|e| CaptureError::Evaluation(format!("scroll to {:.2}: {}", y, e)))?;

        if !self.options.settle_delay.is_zero() {
            tokio::time::sleep(self.options.settle_delay).await;
        }
        Ok(())
    }
}

async fn read_snapshot(session: &dyn RenderSession) -> Result<ScrollSnapshot, CaptureError> {
    let value = session
        .evaluate(SCROLL_SNAPSHOT_SCRIPT)
        .await
        .map_err(|e| CaptureError::Evaluation(format!("read scroll metrics: {e}")))?;
    serde_json::from_value(value)
        .map_err(|e| CaptureError::Evaluation(format!("malformed scroll metrics: {e}")))
}
