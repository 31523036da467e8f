//! Pipeline counters and capture latency
//!
//! Lock-free counters for the hot path plus an HdrHistogram of attempt
//! latencies, read by the `/status` endpoint.

use hdrhistogram::Histogram;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Upper bound of the latency histogram: one hour, in milliseconds
const MAX_TRACKED_LATENCY_MS: u64 = 3_600_000;

/// Attempt latency percentiles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// Median in milliseconds
    pub p50_ms: u64,
    /// 95th percentile in milliseconds
    pub p95_ms: u64,
    /// 99th percentile in milliseconds
    pub p99_ms: u64,
    /// Mean in milliseconds
    pub mean_ms: f64,
    /// Slowest recorded attempt in milliseconds
    pub max_ms: u64,
    /// Attempts recorded
    pub samples: u64,
}

/// Thread-safe latency histogram.
///
/// Tracks 1ms to one hour with 3 significant figures.
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: RwLock<Histogram<u64>>,
}

impl LatencyHistogram {
    /// Create an empty histogram
    pub fn new() -> Self {
        let histogram = Histogram::new_with_bounds(1, MAX_TRACKED_LATENCY_MS, 3)
            .expect("static histogram bounds are valid");
        Self {
            inner: RwLock::new(histogram),
        }
    }

    /// Record a duration; values outside the bounds are saturated
    pub fn record(&self, duration: Duration) {
        let ms = (duration.as_millis() as u64).clamp(1, MAX_TRACKED_LATENCY_MS);
        let _ = self.inner.write().record(ms);
    }

    /// Number of recorded values
    pub fn count(&self) -> u64 {
        self.inner.read().len()
    }

    /// Percentile summary
    pub fn metrics(&self) -> LatencyMetrics {
        let hist = self.inner.read();
        if hist.is_empty() {
            return LatencyMetrics::default();
        }
        LatencyMetrics {
            p50_ms: hist.value_at_percentile(50.0),
            p95_ms: hist.value_at_percentile(95.0),
            p99_ms: hist.value_at_percentile(99.0),
            mean_ms: hist.mean(),
            max_ms: hist.max(),
            samples: hist.len(),
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Jobs accepted by the dispatcher
    pub jobs_submitted: u64,
    /// Jobs without a terminal result yet
    pub jobs_in_flight: u64,
    /// Jobs finished with an image
    pub captures_succeeded: u64,
    /// Jobs finished with an error
    pub captures_failed: u64,
    /// Capture attempts started
    pub attempts: u64,
    /// Attempts scheduled after a failure
    pub retries: u64,
    /// Attempt latency
    pub latency: LatencyMetrics,
}

/// Shared pipeline counters
#[derive(Debug)]
pub struct PipelineStats {
    started: Instant,
    submitted: AtomicU64,
    in_flight: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    attempts: AtomicU64,
    retries: AtomicU64,
    latency: LatencyHistogram,
}

impl PipelineStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            submitted: AtomicU64::new(0),
            in_flight: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            attempts: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            latency: LatencyHistogram::new(),
        }
    }

    /// Seconds since the counters were created
    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    /// A job entered the pipeline
    #[inline]
    pub fn job_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    /// A job published its terminal result
    #[inline]
    pub fn job_finished(&self, success: bool) {
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    /// An attempt finished after `elapsed`
    #[inline]
    pub fn attempt_finished(&self, elapsed: Duration) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.latency.record(elapsed);
    }

    /// A failed job was scheduled for another attempt
    #[inline]
    pub fn retry_scheduled(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Jobs without a terminal result yet
    #[inline]
    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Copy all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            jobs_submitted: self.submitted.load(Ordering::Relaxed),
            jobs_in_flight: self.in_flight(),
            captures_succeeded: self.succeeded.load(Ordering::Relaxed),
            captures_failed: self.failed.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            latency: self.latency.metrics(),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}
