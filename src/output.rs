//! Batch file output
//!
//! Writes the results of a batch run as `screenshot-NNN.png`, numbered by
//! the URL's 1-based position in the batch. A failed write is recorded for
//! that URL and the rest of the batch is still written.

use crate::error::OutputError;
use crate::pipeline::JobResult;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, warn};

/// File name for the URL at `slot` (0-based)
pub fn file_name(slot: usize) -> String {
    format!("screenshot-{:03}.png", slot + 1)
}

/// Outcome of one URL of a batch run
#[derive(Debug)]
pub enum BatchEntry {
    /// Screenshot written to `path`
    Written {
        /// Captured URL
        url: String,
        /// File written
        path: PathBuf,
    },
    /// The capture failed
    CaptureFailed {
        /// Requested URL
        url: String,
        /// Error with attempt count
        error: String,
    },
    /// The capture succeeded but could not be written
    WriteFailed {
        /// Captured URL
        url: String,
        /// Write error
        error: OutputError,
    },
}

impl BatchEntry {
    /// Whether the URL ended up on disk
    pub fn is_written(&self) -> bool {
        matches!(self, BatchEntry::Written { .. })
    }
}

/// Summary of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    /// One entry per URL, in request order
    pub entries: Vec<BatchEntry>,
}

impl BatchReport {
    /// Number of screenshots written
    pub fn written(&self) -> usize {
        self.entries.iter().filter(|e| e.is_written()).count()
    }

    /// Number of URLs without a written screenshot
    pub fn failed(&self) -> usize {
        self.entries.len() - self.written()
    }

    /// Whether every URL was written
    pub fn all_written(&self) -> bool {
        self.failed() == 0
    }
}

/// Writes screenshots into one directory
#[derive(Debug, Clone)]
pub struct ScreenshotWriter {
    dir: PathBuf,
}

impl ScreenshotWriter {
    /// Create the output directory if needed
    pub async fn create(dir: impl AsRef<Path>) -> Result<Self, OutputError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| OutputError::CreateDir {
                path: dir.display().to_string(),
                source,
            })?;
        Ok(Self { dir })
    }

    /// Directory screenshots go to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the image for `slot`
    pub async fn write(&self, slot: usize, png: &[u8]) -> Result<PathBuf, OutputError> {
        let path = self.dir.join(file_name(slot));
        fs::write(&path, png)
            .await
            .map_err(|source| OutputError::Write {
                path: path.display().to_string(),
                source,
            })?;
        Ok(path)
    }

    /// Write every successful result, recording failures per URL
    pub async fn write_all(&self, results: &[JobResult]) -> BatchReport {
        let mut report = BatchReport::default();
        for result in results {
            let entry = match &result.outcome {
                Ok(png) => match self.write(result.slot, png).await {
                    Ok(path) => {
                        info!("Saved {} -> {}", result.url, path.display());
                        BatchEntry::Written {
                            url: result.url.clone(),
                            path,
                        }
                    }
                    Err(e) => {
                        error!("Failed to save screenshot for {}: {}", result.url, e);
                        BatchEntry::WriteFailed {
                            url: result.url.clone(),
                            error: e,
                        }
                    }
                },
                Err(e) => {
                    warn!("Screenshot failed for {}: {}", result.url, e);
                    BatchEntry::CaptureFailed {
                        url: result.url.clone(),
                        error: e.to_string(),
                    }
                }
            };
            report.entries.push(entry);
        }
        report
    }
}
