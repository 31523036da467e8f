//! Request aggregation
//!
//! Validates a batch, fans it out as one job per URL and collects exactly
//! one result per URL under a request-level deadline. Results arrive in
//! completion order and are put back into request order by slot.

use crate::error::{InputError, RequestError, Result};
use crate::pipeline::dispatcher::DispatcherHandle;
use crate::pipeline::job::{Job, JobResult};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

/// Check a batch before any job is created.
///
/// Returns the trimmed URLs.
pub fn validate_batch(urls: &[String], max_urls: usize) -> std::result::Result<Vec<String>, InputError> {
    if urls.is_empty() {
        return Err(InputError::EmptyBatch);
    }
    if urls.len() > max_urls {
        return Err(InputError::TooManyUrls {
            count: urls.len(),
            max: max_urls,
        });
    }
    urls.iter()
        .enumerate()
        .map(|(index, url)| {
            let trimmed = url.trim();
            if trimmed.is_empty() {
                Err(InputError::EmptyUrl { index })
            } else {
                Ok(trimmed.to_string())
            }
        })
        .collect()
}

/// Turns batches into jobs and results
#[derive(Clone)]
pub struct RequestAggregator {
    handle: DispatcherHandle,
    max_urls: usize,
    per_url_timeout: Duration,
}

impl RequestAggregator {
    /// Create an aggregator submitting through `handle`
    pub fn new(handle: DispatcherHandle, max_urls: usize, per_url_timeout: Duration) -> Self {
        Self {
            handle,
            max_urls: max_urls.max(1),
            per_url_timeout,
        }
    }

    /// Largest accepted batch
    pub fn max_urls(&self) -> usize {
        self.max_urls
    }

    /// The dispatcher handle in use
    pub fn handle(&self) -> &DispatcherHandle {
        &self.handle
    }

    /// Deadline for a batch of `url_count` URLs
    pub fn request_timeout(&self, url_count: usize) -> Duration {
        self.per_url_timeout.saturating_mul(url_count.max(1) as u32)
    }

    /// Capture every URL of the batch, one result per URL in request order
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn capture_batch(&self, urls: Vec<String>) -> Result<Vec<JobResult>> {
        let urls = validate_batch(&urls, self.max_urls)?;
        let expected = urls.len();
        let request_timeout = self.request_timeout(expected);
        let deadline = Instant::now() + request_timeout;
        let deadline_exceeded = |received: usize| RequestError::DeadlineExceeded {
            received,
            expected,
            timeout_secs: request_timeout.as_secs(),
        };

        let (sink, mut results) = mpsc::channel(expected);
        for (slot, url) in urls.into_iter().enumerate() {
            let job = Job::new(slot, url, sink.clone());
            debug!(job = %job.id, slot, "Submitting {}", job.url);
            match timeout_at(deadline, self.handle.submit(job)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(RequestError::from(e).into()),
                Err(_) => {
                    warn!("Request deadline passed while queueing");
                    return Err(deadline_exceeded(0).into());
                }
            }
        }
        drop(sink);

        let mut collected = Vec::with_capacity(expected);
        while collected.len() < expected {
            match timeout_at(deadline, results.recv()).await {
                Ok(Some(result)) => collected.push(result),
                Ok(None) => {
                    return Err(RequestError::Incomplete {
                        received: collected.len(),
                        expected,
                    }
                    .into());
                }
                Err(_) => {
                    warn!(
                        "Request deadline of {:?} exceeded with {}/{} results",
                        request_timeout,
                        collected.len(),
                        expected
                    );
                    return Err(deadline_exceeded(collected.len()).into());
                }
            }
        }

        collected.sort_by_key(|r| r.slot);
        let failed = collected.iter().filter(|r| !r.is_success()).count();
        info!("Batch of {} finished, {} failed", expected, failed);
        Ok(collected)
    }
}
