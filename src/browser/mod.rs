//! Browser automation module
//!
//! The render engine capability used by the capture pipeline, and its
//! ChromiumOxide implementation: lifecycle management, navigation and
//! clip capture over CDP.

pub mod controller;
pub mod engine;
pub mod navigation;

pub use controller::{BrowserConfig, BrowserController, ChromeEngine, ChromeSession};
pub use engine::{ClipRegion, RenderEngine, RenderResult, RenderSession, ViewportSize};
pub use navigation::{PageNavigator, UrlValidator};
