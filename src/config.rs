//! Service configuration
//!
//! Settings are read from an optional JSON file and then overridden by
//! `FAFOSNAP_*` environment variables. Non-positive numeric values fall
//! back to defaults through the `effective_*` accessors, so a partially
//! filled file still yields a runnable service.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "FAFOSNAP_";

const DEFAULT_SERVER_PORT: u16 = 8080;
const DEFAULT_WORKER_COUNT: i64 = 2;
const DEFAULT_JOB_TIMEOUT_SECS: u64 = 90;
const DEFAULT_REQUEST_TIMEOUT_PER_URL_SECS: u64 = 60;
const DEFAULT_MAX_URLS_PER_REQUEST: usize = 8;
const DEFAULT_MAX_ATTEMPTS: u32 = 2;
const DEFAULT_SETTLE_DELAY_MS: u64 = 2000;
const DEFAULT_MAX_SECTIONS: usize = 500;

/// Top-level service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// HTTP listen port
    pub server_port: u16,
    /// Concurrent capture workers (<= 0 means 1)
    pub worker_count: i64,
    /// Hard deadline of one capture attempt, in seconds (<= 0 means default)
    pub job_timeout_seconds: i64,
    /// Upper bound on URLs in one request (<= 0 means 8)
    pub max_urls_per_request: i64,
    /// Attempts per URL including the first (<= 0 means 2)
    pub max_attempts: i64,
    /// URLs captured by `batch` when none are given on the command line
    pub default_urls: Vec<String>,
    /// Wait after each scroll, in milliseconds
    pub settle_delay_ms: u64,
    /// Hard cap on sections per capture
    pub max_sections: usize,
    /// Emulated viewport width
    pub viewport_width: u32,
    /// Emulated viewport height
    pub viewport_height: u32,
    /// Chrome/Chromium executable (None = auto-detect)
    pub chrome_path: Option<String>,
    /// Run Chromium with its sandbox
    pub sandbox: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_SERVER_PORT,
            worker_count: DEFAULT_WORKER_COUNT,
            job_timeout_seconds: DEFAULT_JOB_TIMEOUT_SECS as i64,
            max_urls_per_request: DEFAULT_MAX_URLS_PER_REQUEST as i64,
            max_attempts: DEFAULT_MAX_ATTEMPTS as i64,
            default_urls: Vec::new(),
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            max_sections: DEFAULT_MAX_SECTIONS,
            viewport_width: 1920,
            viewport_height: 1080,
            chrome_path: None,
            sandbox: true,
        }
    }
}

impl Config {
    /// Read a JSON config file without applying environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load configuration the way the binary does.
    ///
    /// An explicit path must exist. Without one, `config.json` in the
    /// working directory is used when present, defaults otherwise. The
    /// process environment is applied last.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let fallback = Path::new("config.json");
                if fallback.exists() {
                    Self::from_file(fallback)?
                } else {
                    debug!("No config.json found, using defaults");
                    Self::default()
                }
            }
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Apply `FAFOSNAP_*` overrides using `lookup` to resolve variables.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = parse_override(&lookup, "SERVER_PORT")? {
            self.server_port = port;
        }
        if let Some(count) = parse_override(&lookup, "WORKER_COUNT")? {
            self.worker_count = count;
        }
        if let Some(secs) = parse_override(&lookup, "JOB_TIMEOUT_SECONDS")? {
            self.job_timeout_seconds = secs;
        }
        if let Some(max) = parse_override(&lookup, "MAX_URLS_PER_REQUEST")? {
            self.max_urls_per_request = max;
        }
        if let Some(max) = parse_override(&lookup, "MAX_ATTEMPTS")? {
            self.max_attempts = max;
        }
        if let Some(raw) = lookup(&format!("{ENV_PREFIX}DEFAULT_URLS")) {
            self.default_urls = raw
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(path) = lookup(&format!("{ENV_PREFIX}CHROME_PATH")) {
            self.chrome_path = Some(path).filter(|p| !p.is_empty());
        }
        Ok(())
    }

    /// Number of workers to spawn, never zero
    pub fn effective_worker_count(&self) -> usize {
        if self.worker_count <= 0 {
            warn!(
                "workerCount ({}) invalid, defaulting to 1",
                self.worker_count
            );
            1
        } else {
            self.worker_count as usize
        }
    }

    /// Attempts per URL, never zero
    pub fn effective_max_attempts(&self) -> u32 {
        if self.max_attempts <= 0 {
            DEFAULT_MAX_ATTEMPTS
        } else {
            self.max_attempts.min(u32::MAX as i64) as u32
        }
    }

    /// URL cap per request, never zero
    pub fn effective_max_urls(&self) -> usize {
        if self.max_urls_per_request <= 0 {
            DEFAULT_MAX_URLS_PER_REQUEST
        } else {
            self.max_urls_per_request as usize
        }
    }

    /// Deadline of a single capture attempt
    pub fn job_timeout(&self) -> Duration {
        if self.job_timeout_seconds <= 0 {
            Duration::from_secs(DEFAULT_JOB_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.job_timeout_seconds as u64)
        }
    }

    /// Deadline of a whole request covering `url_count` URLs
    pub fn request_timeout(&self, url_count: usize) -> Duration {
        let per_url = if self.job_timeout_seconds <= 0 {
            DEFAULT_REQUEST_TIMEOUT_PER_URL_SECS
        } else {
            self.job_timeout_seconds as u64
        };
        Duration::from_secs(per_url.saturating_mul(url_count.max(1) as u64))
    }

    /// Wait after each scroll
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

fn parse_override<T, F>(lookup: &F, suffix: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let var = format!("{ENV_PREFIX}{suffix}");
    match lookup(&var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidOverride {
                var,
                reason: e.to_string(),
                value,
            }),
    }
}
