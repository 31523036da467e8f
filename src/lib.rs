//! fafosnap - Full-Page Screenshot Service
//!
//! Captures full-page screenshots of arbitrary web pages through headless
//! Chromium (CDP) and exposes the capability as a bounded, retrying job
//! pipeline behind a small HTTP API.
//!
//! # Features
//!
//! - **Sectioned capture**: pages are walked viewport by viewport, so lazy
//!   and infinite-scroll pages are captured as far as they grow
//! - **Stitching**: slices are composed into one PNG
//! - **Worker pool**: fixed concurrency, bounded queue, per-URL retries
//! - **HTTP API**: `POST /screenshots` plus health and status endpoints
//!
//! # Architecture
//!
//! ```text
//! HTTP / batch ──▶ RequestAggregator ──▶ Dispatcher ──▶ RetryController
//!                         ▲                                  │
//!                         │                                  ▼
//!                    JobResult ◀──────────────── CaptureOrchestrator
//!                                                     │
//!                                       ┌─────────────┴────────────┐
//!                                       ▼                          ▼
//!                               SectionCapture ──chunks──▶    Stitcher
//!                                       │
//!                                       ▼
//!                             RenderEngine (Chromium)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use fafosnap::browser::{BrowserConfig, ChromeEngine};
//! use fafosnap::capture::{CaptureOptions, CaptureOrchestrator};
//! use fafosnap::pipeline::{Dispatcher, DispatcherOptions, RequestAggregator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Arc::new(ChromeEngine::new(BrowserConfig::default()));
//!     let capture = Arc::new(CaptureOrchestrator::new(engine, CaptureOptions::default()));
//!     let dispatcher = Dispatcher::start(DispatcherOptions::default(), capture);
//!
//!     let aggregator = RequestAggregator::new(dispatcher.handle(), 8, Duration::from_secs(60));
//!     let results = aggregator
//!         .capture_batch(vec!["https://example.com".to_string()])
//!         .await?;
//!     println!("{} bytes", results[0].outcome.as_ref().map(Vec::len).unwrap_or(0));
//!
//!     dispatcher.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod browser;
pub mod capture;
pub mod config;
pub mod error;
pub mod handlers;
pub mod output;
pub mod pipeline;

// Re-exports for convenience
pub use browser::{ChromeEngine, RenderEngine, RenderSession};
pub use capture::{Capture, CaptureOrchestrator};
pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Dispatcher, RequestAggregator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
