//! Retry controller
//!
//! Wraps one capture attempt with bounded retry-on-failure. A failed job is
//! not re-enqueued by a detached task; it goes to the retry lane, a bounded
//! channel owned here and drained by workers before fresh submissions.

use crate::capture::Capture;
use crate::error::CaptureError;
use crate::pipeline::job::{Job, JobError};
use crate::pipeline::stats::PipelineStats;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{info, instrument, warn};

/// What happened to a job after one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// The terminal result was published
    Completed,
    /// The job is waiting in the retry lane
    Rescheduled,
}

/// Runs attempts and decides between publishing and retrying
pub struct RetryController {
    capture: Arc<dyn Capture>,
    max_attempts: u32,
    attempt_timeout: Duration,
    retries: mpsc::Sender<Job>,
    stats: Arc<PipelineStats>,
}

impl RetryController {
    /// Create a controller feeding failed jobs into `retries`
    pub fn new(
        capture: Arc<dyn Capture>,
        max_attempts: u32,
        attempt_timeout: Duration,
        retries: mpsc::Sender<Job>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            capture,
            max_attempts: max_attempts.max(1),
            attempt_timeout,
            retries,
            stats,
        }
    }

    /// Attempts allowed per job
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run one attempt of `job`
    #[instrument(skip_all, fields(job = %job.id, url = %job.url, attempt = job.attempt + 1))]
    pub async fn run(&self, mut job: Job) -> RetryDecision {
        job.attempt += 1;
        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.attempt_timeout, self.capture.capture(&job.url)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CaptureError::Timeout(self.attempt_timeout.as_millis() as u64)),
        };
        self.stats.attempt_finished(started.elapsed());

        let err = match outcome {
            Ok(image) => {
                info!("Captured {} ({} bytes)", job.url, image.len());
                self.stats.job_finished(true);
                job.publish(Ok(image)).await;
                return RetryDecision::Completed;
            }
            Err(err) => err,
        };

        if err.is_retryable() && job.attempt < self.max_attempts {
            warn!(
                error = %err,
                "Attempt {}/{} failed, retrying",
                job.attempt,
                self.max_attempts
            );
            self.stats.retry_scheduled();
            return self.reschedule(job, err).await;
        }

        if !err.is_retryable() {
            warn!(error = %err, "Not retrying");
        } else {
            warn!(error = %err, "Giving up after {} attempts", job.attempt);
        }
        self.fail(job, &err).await;
        RetryDecision::Completed
    }

    async fn reschedule(&self, job: Job, err: CaptureError) -> RetryDecision {
        let job = match self.retries.try_send(job) {
            Ok(()) => return RetryDecision::Rescheduled,
            Err(TrySendError::Full(job)) => job,
            Err(TrySendError::Closed(job)) => {
                self.fail(job, &err).await;
                return RetryDecision::Completed;
            }
        };

        warn!("Retry lane full, waiting for room");
        match self.retries.send(job).await {
            Ok(()) => RetryDecision::Rescheduled,
            Err(mpsc::error::SendError(job)) => {
                self.fail(job, &err).await;
                RetryDecision::Completed
            }
        }
    }

    async fn fail(&self, job: Job, err: &CaptureError) {
        let error = JobError {
            message: err.to_string(),
            attempts: job.attempt,
        };
        self.stats.job_finished(false);
        job.publish(Err(error)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailFirst {
        failures: u32,
        calls: AtomicU32,
        error: CaptureError,
    }

    #[async_trait]
    impl Capture for FailFirst {
        async fn capture(&self, _url: &str) -> Result<Vec<u8>, CaptureError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(self.error.clone())
            } else {
                Ok(vec![0x89, b'P', b'N', b'G'])
            }
        }
    }

    fn controller(
        capture: FailFirst,
        max_attempts: u32,
    ) -> (RetryController, mpsc::Receiver<Job>, Arc<PipelineStats>) {
        let (tx, rx) = mpsc::channel(4);
        let stats = Arc::new(PipelineStats::new());
        let controller = RetryController::new(
            Arc::new(capture),
            max_attempts,
            Duration::from_secs(5),
            tx,
            stats.clone(),
        );
        (controller, rx, stats)
    }

    #[tokio::test]
    async fn test_failure_goes_to_retry_lane() {
        let capture = FailFirst {
            failures: 1,
            calls: AtomicU32::new(0),
            error: CaptureError::Navigation("reset".into()),
        };
        let (controller, mut lane, stats) = controller(capture, 2);
        let (sink, mut results) = mpsc::channel(1);
        stats.job_submitted();

        let decision = controller.run(Job::new(0, "https://a.example", sink)).await;
        assert_eq!(decision, RetryDecision::Rescheduled);
        let job = lane.try_recv().unwrap();
        assert_eq!(job.attempt, 1);

        assert_eq!(controller.run(job).await, RetryDecision::Completed);
        let result = results.recv().await.unwrap();
        assert_eq!(result.attempts, 2);
        assert!(result.is_success());
        assert_eq!(stats.snapshot().retries, 1);
        assert_eq!(stats.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_invalid_url_is_not_retried() {
        let capture = FailFirst {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            error: CaptureError::InvalidUrl("ftp://a.example".into()),
        };
        let (controller, mut lane, stats) = controller(capture, 5);
        let (sink, mut results) = mpsc::channel(1);
        stats.job_submitted();

        let decision = controller.run(Job::new(0, "ftp://a.example", sink)).await;
        assert_eq!(decision, RetryDecision::Completed);
        assert!(lane.try_recv().is_err());

        let err = results.recv().await.unwrap().outcome.unwrap_err();
        assert_eq!(err.attempts, 1);
        assert!(err.message.starts_with("invalid url"));
    }

    #[tokio::test]
    async fn test_exhausted_attempts_report_count() {
        let capture = FailFirst {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            error: CaptureError::ZeroHeightPage,
        };
        let (controller, mut lane, stats) = controller(capture, 2);
        let (sink, mut results) = mpsc::channel(1);
        stats.job_submitted();

        let mut job = Job::new(0, "https://a.example", sink);
        job.attempt = 1;
        assert_eq!(controller.run(job).await, RetryDecision::Completed);
        assert!(lane.try_recv().is_err());

        let err = results.recv().await.unwrap().outcome.unwrap_err();
        assert_eq!(err.to_string(), "page reports zero scroll height (after 2 attempts)");
        assert_eq!(stats.snapshot().captures_failed, 1);
    }

    #[tokio::test]
    async fn test_closed_lane_publishes_failure() {
        let capture = FailFirst {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
            error: CaptureError::Timeout(10),
        };
        let (controller, lane, stats) = controller(capture, 3);
        drop(lane);
        let (sink, mut results) = mpsc::channel(1);
        stats.job_submitted();

        assert_eq!(
            controller.run(Job::new(0, "https://a.example", sink)).await,
            RetryDecision::Completed
        );
        assert!(!results.recv().await.unwrap().is_success());
    }
}
