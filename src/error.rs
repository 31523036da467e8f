//! Error types for fafosnap
//!
//! This module provides the error hierarchy using `thiserror`. Capture-path
//! errors carry an explicit retry policy via [`CaptureError::is_retryable`].

use thiserror::Error;

/// The main error type for fafosnap operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (fatal at startup)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rejected batch input
    #[error("Input error: {0}")]
    Input(#[from] InputError),

    /// Browser lifecycle errors
    #[error("Browser error: {0}")]
    Browser(#[from] BrowserError),

    /// Capture attempt errors
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Job queue errors
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    /// Whole-request failures
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    /// Screenshot persistence errors
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// ChromiumOxide errors
    #[error("CDP error: {0}")]
    Cdp(String),
}

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path that was read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the schema
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override could not be parsed
    #[error("invalid {var}={value:?}: {reason}")]
    InvalidOverride {
        /// Environment variable name
        var: String,
        /// Raw value
        value: String,
        /// Parse failure
        reason: String,
    },
}

/// Batch validation errors, raised before any job exists
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// Body was not a valid `{"urls": [...]}` document
    #[error("invalid JSON payload: {0}")]
    MalformedPayload(String),

    /// No URLs supplied
    #[error("urls array must not be empty")]
    EmptyBatch,

    /// More URLs than the per-request cap
    #[error("too many urls in request: {count} (max {max})")]
    TooManyUrls {
        /// URLs supplied
        count: usize,
        /// Configured cap
        max: usize,
    },

    /// A URL was empty after trimming
    #[error("urls must not contain empty values (index {index})")]
    EmptyUrl {
        /// Position in the batch
        index: usize,
    },
}

/// Browser lifecycle and control errors
#[derive(Error, Debug)]
pub enum BrowserError {
    /// Failed to launch browser
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    /// Browser configuration error
    #[error("Invalid browser configuration: {0}")]
    ConfigError(String),

    /// Failed to create new page/tab
    #[error("Failed to create page: {0}")]
    PageCreationFailed(String),
}

/// Errors of a single capture attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    /// Render session could not be opened
    #[error("failed to open render session: {0}")]
    Session(String),

    /// URL could not be parsed or has an unsupported scheme
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Navigation failed
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Render deadline exceeded
    #[error("capture timed out after {0}ms")]
    Timeout(u64),

    /// A page script failed or returned an unexpected value
    #[error("script evaluation failed: {0}")]
    Evaluation(String),

    /// The page reported nothing to capture
    #[error("page reports zero scroll height")]
    ZeroHeightPage,

    /// A clip capture failed
    #[error("capture section {section}: {reason}")]
    SectionCapture {
        /// 1-based section number
        section: usize,
        /// Engine error
        reason: String,
    },

    /// A captured clip could not be decoded
    #[error("decode section {section}: {reason}")]
    SectionDecode {
        /// 1-based section number
        section: usize,
        /// Decoder error
        reason: String,
    },

    /// Scrolling made no progress before the page was covered
    #[error("scroll stalled at y={scroll_y:.0} of {scroll_height:.0} after {stalls} attempts")]
    ScrollStalled {
        /// Stuck scroll position
        scroll_y: f64,
        /// Document height at the time
        scroll_height: f64,
        /// Consecutive stalls observed
        stalls: u32,
    },

    /// The section loop ended without any chunk
    #[error("no screenshot sections captured")]
    NoChunksCaptured,

    /// The stitched image could not be encoded
    #[error("encode stitched screenshot: {0}")]
    Encoding(String),
}

impl CaptureError {
    /// Whether a fresh attempt may succeed where this one failed.
    ///
    /// Every render-path failure is retried as a whole new attempt; only
    /// malformed input is final.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CaptureError::InvalidUrl(_))
    }
}

/// Job queue errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The dispatcher has been shut down
    #[error("dispatcher is closed")]
    Closed,
}

/// Failures of a whole aggregated request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Request deadline elapsed before every URL reported
    #[error("timed out waiting for screenshots ({received}/{expected} received after {timeout_secs}s)")]
    DeadlineExceeded {
        /// Results received before the deadline
        received: usize,
        /// Results expected
        expected: usize,
        /// Deadline in seconds
        timeout_secs: u64,
    },

    /// Jobs could not be queued
    #[error("screenshot queue unavailable: {0}")]
    Dispatch(#[from] DispatchError),

    /// Result channel closed before every URL reported
    #[error("result channel closed ({received}/{expected} received)")]
    Incomplete {
        /// Results received
        received: usize,
        /// Results expected
        expected: usize,
    },
}

/// Screenshot persistence errors
#[derive(Error, Debug)]
pub enum OutputError {
    /// Output directory could not be created
    #[error("failed to create output directory {path}: {source}")]
    CreateDir {
        /// Directory path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Screenshot file could not be written
    #[error("failed to write {path}: {source}")]
    Write {
        /// File path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for fafosnap operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a CDP error from a string
    pub fn cdp<S: Into<String>>(msg: S) -> Self {
        Error::Cdp(msg.into())
    }
}

/// Convert chromiumoxide errors
impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Cdp(err.to_string())
    }
}

impl From<BrowserError> for CaptureError {
    fn from(err: BrowserError) -> Self {
        CaptureError::Session(err.to_string())
    }
}
