//! Browser lifecycle management
//!
//! This module handles browser launch and shutdown, and implements the
//! render engine traits on top of chromiumoxide. Every session launches
//! its own browser process so attempts never share state.

use crate::browser::engine::{ClipRegion, RenderEngine, RenderResult, RenderSession, ViewportSize};
use crate::browser::navigation::PageNavigator;
use crate::config::Config;
use crate::error::{BrowserError, CaptureError, Error, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const HANDLER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Browser window width (default: 1920)
    pub width: u32,
    /// Browser window height (default: 1080)
    pub height: u32,
    /// Enable sandbox (default: true for production)
    pub sandbox: bool,
    /// Navigation and readiness timeout in milliseconds (default: 30000)
    pub timeout_ms: u64,
    /// Path to Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            sandbox: true,
            timeout_ms: 30000,
            chrome_path: None,
        }
    }
}

impl BrowserConfig {
    /// Create a new config builder
    pub fn builder() -> BrowserConfigBuilder {
        BrowserConfigBuilder::default()
    }

    /// Derive launch settings from the service configuration
    pub fn from_service_config(config: &Config) -> Self {
        let mut builder = Self::builder()
            .viewport(config.viewport_width, config.viewport_height)
            .sandbox(config.sandbox)
            .timeout_ms(config.job_timeout().as_millis() as u64);
        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_path(path);
        }
        builder.build()
    }
}

/// Builder for BrowserConfig
#[derive(Default)]
pub struct BrowserConfigBuilder {
    config: BrowserConfig,
}

impl BrowserConfigBuilder {
    /// Set viewport dimensions
    pub fn viewport(mut self, width: u32, height: u32) -> Self {
        self.config.width = width;
        self.config.height = height;
        self
    }

    /// Enable/disable sandbox
    pub fn sandbox(mut self, sandbox: bool) -> Self {
        self.config.sandbox = sandbox;
        self
    }

    /// Set navigation timeout
    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.config.timeout_ms = ms;
        self
    }

    /// Set Chrome path
    pub fn chrome_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.chrome_path = Some(path.into());
        self
    }

    /// Build the config
    pub fn build(self) -> BrowserConfig {
        self.config
    }
}

/// A launched browser process and its CDP event loop
pub struct BrowserController {
    browser: Browser,
    handler: JoinHandle<()>,
    config: BrowserConfig,
}

impl BrowserController {
    /// Launch a browser with `config`, emulating `viewport` on every page
    #[instrument(skip(config))]
    pub async fn launch(config: BrowserConfig, viewport: ViewportSize) -> Result<Self> {
        debug!(
            "Launching browser: viewport={}x{} sandbox={}",
            viewport.width, viewport.height, config.sandbox
        );

        let mut builder = CdpBrowserConfig::builder();

        builder = builder.viewport(chromiumoxide::handler::viewport::Viewport {
            width: viewport.width,
            height: viewport.height,
            device_scale_factor: None,
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        });

        if !config.sandbox {
            builder = builder.arg("--no-sandbox");
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder.build().map_err(BrowserError::ConfigError)?;

        let (browser, mut handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    warn!("Browser handler event error");
                    break;
                }
            }
            debug!("Browser handler finished");
        });

        Ok(Self {
            browser,
            handler: handler_task,
            config,
        })
    }

    /// Create a new blank page
    pub async fn new_page(&self) -> Result<Page> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::PageCreationFailed(e.to_string()))?;
        Ok(page)
    }

    /// Get the browser configuration
    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    /// Close the browser and wait for its event loop
    #[instrument(skip(self))]
    pub async fn close(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| Error::cdp(e.to_string()))?;

        let _ = tokio::time::timeout(HANDLER_SHUTDOWN_GRACE, self.handler).await;

        debug!("Browser closed");
        Ok(())
    }
}

/// Render engine backed by locally launched Chromium processes
#[derive(Debug, Clone)]
pub struct ChromeEngine {
    config: BrowserConfig,
}

impl ChromeEngine {
    /// Create an engine launching browsers with `config`
    pub fn new(config: BrowserConfig) -> Self {
        info!(
            "Chrome engine ready (chrome_path={:?}, sandbox={})",
            config.chrome_path, config.sandbox
        );
        Self { config }
    }
}

#[async_trait]
impl RenderEngine for ChromeEngine {
    async fn open_session(&self, viewport: ViewportSize) -> RenderResult<Box<dyn RenderSession>> {
        let controller = BrowserController::launch(self.config.clone(), viewport)
            .await
            .map_err(into_session_error)?;

        let page = match controller.new_page().await {
            Ok(page) => page,
            Err(e) => {
                if let Err(close_err) = controller.close().await {
                    warn!("Failed to close browser after page error: {}", close_err);
                }
                return Err(into_session_error(e));
            }
        };

        Ok(Box::new(ChromeSession { controller, page }))
    }
}

fn into_session_error(err: Error) -> CaptureError {
    match err {
        Error::Browser(e) => e.into(),
        other => CaptureError::Session(other.to_string()),
    }
}

/// One page in a dedicated browser process
pub struct ChromeSession {
    controller: BrowserController,
    page: Page,
}

impl ChromeSession {
    fn timeout(&self) -> Duration {
        Duration::from_millis(self.controller.config().timeout_ms)
    }
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn navigate(&self, url: &str) -> RenderResult<()> {
        PageNavigator::goto(&self.page, url, self.timeout()).await
    }

    async fn wait_for_element(&self, selector: &str) -> RenderResult<()> {
        PageNavigator::wait_for_element(&self.page, selector, self.timeout()).await
    }

    async fn evaluate(&self, script: &str) -> RenderResult<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| CaptureError::Evaluation(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn capture_clip(&self, clip: ClipRegion) -> RenderResult<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(Viewport {
                x: clip.x,
                y: clip.y,
                width: clip.width,
                height: clip.height,
                scale: clip.scale,
            })
            .from_surface(true)
            .build();

        let data = self
            .page
            .screenshot(params)
            .await
            .map_err(|e| CaptureError::Evaluation(format!("screenshot: {e}")))?;

        debug!("Clip captured: {} bytes", data.len());
        Ok(data)
    }

    async fn close(self: Box<Self>) -> RenderResult<()> {
        let ChromeSession { controller, page } = *self;
        drop(page);
        controller.close().await.map_err(into_session_error)
    }
}
