//! Scripted render engines and captures shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use fafosnap::browser::{ClipRegion, RenderEngine, RenderResult, RenderSession, ViewportSize};
use fafosnap::capture::{Capture, SCROLL_SNAPSHOT_SCRIPT};
use fafosnap::error::CaptureError;
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a fake page behaves
#[derive(Debug, Clone)]
pub struct PageScript {
    /// Initial document height in CSS pixels
    pub height: f64,
    /// Document width in CSS pixels
    pub width: f64,
    /// Viewport height reported by the page
    pub viewport_height: f64,
    /// Device pixel ratio
    pub dpr: f64,
    /// Height added after every scroll
    pub grow_by: f64,
    /// Scrolling has no effect
    pub frozen: bool,
    /// Navigations that fail before one succeeds, counted across sessions
    pub navigation_failures: u32,
    /// Navigation never completes
    pub hang_navigation: bool,
}

impl PageScript {
    pub fn new(height: f64) -> Self {
        Self {
            height,
            width: 100.0,
            viewport_height: 50.0,
            dpr: 1.0,
            grow_by: 0.0,
            frozen: false,
            navigation_failures: 0,
            hang_navigation: false,
        }
    }
}

/// Render engine serving one scripted page to every session
pub struct ScriptedEngine {
    script: PageScript,
    navigations: Arc<AtomicU32>,
    opened: AtomicU32,
    closed: Arc<AtomicU32>,
}

impl ScriptedEngine {
    pub fn new(script: PageScript) -> Self {
        Self {
            script,
            navigations: Arc::new(AtomicU32::new(0)),
            opened: AtomicU32::new(0),
            closed: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn sessions_opened(&self) -> u32 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn sessions_closed(&self) -> u32 {
        self.closed.load(Ordering::SeqCst)
    }

    /// Open a session directly, already past navigation
    pub fn session(&self) -> ScriptedSession {
        ScriptedSession {
            script: self.script.clone(),
            state: Mutex::new(PageState {
                scroll_y: 0.0,
                height: self.script.height,
            }),
            navigations: self.navigations.clone(),
            closed: self.closed.clone(),
        }
    }
}

#[async_trait]
impl RenderEngine for ScriptedEngine {
    async fn open_session(&self, _viewport: ViewportSize) -> RenderResult<Box<dyn RenderSession>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.session()))
    }
}

struct PageState {
    scroll_y: f64,
    height: f64,
}

pub struct ScriptedSession {
    script: PageScript,
    state: Mutex<PageState>,
    navigations: Arc<AtomicU32>,
    closed: Arc<AtomicU32>,
}

impl ScriptedSession {
    fn snapshot(&self) -> Value {
        let state = self.state.lock().unwrap();
        json!({
            "scrollY": state.scroll_y,
            "scrollHeight": state.height,
            "scrollWidth": self.script.width,
            "innerHeight": self.script.viewport_height,
            "innerWidth": self.script.width,
            "dpr": self.script.dpr,
        })
    }

    fn scroll_to(&self, y: f64) {
        let mut state = self.state.lock().unwrap();
        if !self.script.frozen {
            let max_scroll = (state.height - self.script.viewport_height).max(0.0);
            state.scroll_y = y.clamp(0.0, max_scroll);
        }
        if y > 0.0 {
            state.height += self.script.grow_by;
        }
    }
}

#[async_trait]
impl RenderSession for ScriptedSession {
    async fn navigate(&self, url: &str) -> RenderResult<()> {
        if self.script.hang_navigation {
            std::future::pending::<()>().await;
        }
        let call = self.navigations.fetch_add(1, Ordering::SeqCst);
        if call < self.script.navigation_failures {
            return Err(CaptureError::Navigation(format!("{url}: net::ERR_CONNECTION_RESET")));
        }
        Ok(())
    }

    async fn wait_for_element(&self, _selector: &str) -> RenderResult<()> {
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> RenderResult<Value> {
        if script == SCROLL_SNAPSHOT_SCRIPT {
            return Ok(self.snapshot());
        }
        if let Some(arg) = script
            .strip_prefix("window.scrollTo(0, ")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let y: f64 = arg
                .trim()
                .parse()
                .map_err(|_| CaptureError::Evaluation(format!("bad scroll target {arg}")))?;
            self.scroll_to(y);
            return Ok(Value::Null);
        }
        Err(CaptureError::Evaluation(format!("unexpected script: {script}")))
    }

    async fn capture_clip(&self, clip: ClipRegion) -> RenderResult<Vec<u8>> {
        let width = (clip.width * clip.scale).round() as u32;
        let height = (clip.height * clip.scale).round() as u32;
        let shade = (clip.y as u32 % 251) as u8;
        Ok(png(width, height, shade))
    }

    async fn close(self: Box<Self>) -> RenderResult<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Solid PNG of the given size
pub fn png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let image = RgbaImage::from_pixel(width, height, Rgba([shade, 255 - shade, 0, 255]));
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

/// Per-URL behaviour of a [`ScriptedCapture`]
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Fail this many times, then succeed
    FailFirst(u32),
    /// Never return
    Hang,
    /// Always fail with this error
    AlwaysFail(CaptureError),
    /// Succeed after sleeping
    Slow(Duration),
}

/// Capture whose outcome is scripted per URL; unknown URLs succeed
#[derive(Default)]
pub struct ScriptedCapture {
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<HashMap<String, u32>>,
}

impl ScriptedCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(url.to_string(), behavior);
        self
    }

    /// Attempts made for `url`
    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Capture for ScriptedCapture {
    async fn capture(&self, url: &str) -> Result<Vec<u8>, CaptureError> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let entry = calls.entry(url.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        match self.behaviors.get(url) {
            Some(Behavior::FailFirst(n)) if call <= *n => {
                Err(CaptureError::Navigation(format!("{url}: attempt {call} failed")))
            }
            Some(Behavior::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(Behavior::AlwaysFail(err)) => Err(err.clone()),
            Some(Behavior::Slow(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(png(4, 4, 1))
            }
            _ => Ok(png(4, 4, call as u8)),
        }
    }
}
