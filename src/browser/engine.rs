//! Render engine capability
//!
//! The capture pipeline talks to the browser only through these traits.
//! Browser-side scripts are opaque payloads handed to
//! [`RenderSession::evaluate`]; the pipeline never inspects them.

use crate::error::CaptureError;
use async_trait::async_trait;
use serde_json::Value;

/// Result of a render engine call
pub type RenderResult<T> = std::result::Result<T, CaptureError>;

/// Viewport emulated by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportSize {
    /// Width in CSS pixels
    pub width: u32,
    /// Height in CSS pixels
    pub height: u32,
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Rectangle to capture, in document CSS pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRegion {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
    /// Device pixels per CSS pixel
    pub scale: f64,
}

/// Opens exclusive render sessions
#[async_trait]
pub trait RenderEngine: Send + Sync + 'static {
    /// Open a fresh session emulating `viewport`
    async fn open_session(&self, viewport: ViewportSize) -> RenderResult<Box<dyn RenderSession>>;
}

/// One exclusive browser page, owned by a single capture attempt
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Navigate to `url`
    async fn navigate(&self, url: &str) -> RenderResult<()>;

    /// Block until the document is ready and `selector` matches
    async fn wait_for_element(&self, selector: &str) -> RenderResult<()>;

    /// Evaluate a script and return its JSON value
    async fn evaluate(&self, script: &str) -> RenderResult<Value>;

    /// Capture `clip` as an encoded image
    async fn capture_clip(&self, clip: ClipRegion) -> RenderResult<Vec<u8>>;

    /// Tear the session down
    async fn close(self: Box<Self>) -> RenderResult<()>;
}
