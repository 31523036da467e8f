//! Jobs and their terminal results

use std::fmt;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Where a job's terminal result goes
pub type ResultSink = mpsc::Sender<JobResult>;

/// One URL of a batch, travelling through the worker pool
#[derive(Debug)]
pub struct Job {
    /// Unique id, stable across retries
    pub id: Uuid,
    /// Position of the URL in its batch
    pub slot: usize,
    /// URL to capture
    pub url: String,
    /// Attempts made so far
    pub attempt: u32,
    sink: ResultSink,
}

impl Job {
    /// Create a job that has not been attempted yet
    pub fn new(slot: usize, url: impl Into<String>, sink: ResultSink) -> Self {
        Self {
            id: Uuid::new_v4(),
            slot,
            url: url.into(),
            attempt: 0,
            sink,
        }
    }

    /// Publish the terminal result, consuming the job.
    ///
    /// Returns `false` when the requester stopped listening.
    pub async fn publish(self, outcome: Result<Vec<u8>, JobError>) -> bool {
        let result = JobResult {
            slot: self.slot,
            url: self.url,
            attempts: self.attempt,
            outcome,
        };
        match self.sink.send(result).await {
            Ok(()) => true,
            Err(_) => {
                debug!(job = %self.id, "Requester gone, dropping result");
                false
            }
        }
    }
}

/// Terminal outcome of a job, published exactly once
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Position of the URL in its batch
    pub slot: usize,
    /// URL that was captured
    pub url: String,
    /// Attempts made
    pub attempts: u32,
    /// PNG bytes or the last error
    pub outcome: Result<Vec<u8>, JobError>,
}

impl JobResult {
    /// Whether the capture produced an image
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// The last error of a job together with the attempts made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobError {
    /// Last attempt's error
    pub message: String,
    /// Attempts made
    pub attempts: u32,
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.attempts == 1 { "attempt" } else { "attempts" };
        write!(f, "{} (after {} {})", self.message, self.attempts, noun)
    }
}

impl std::error::Error for JobError {}
