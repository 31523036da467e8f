//! Job pipeline
//!
//! Batches become [`job::Job`]s, a fixed pool of workers runs them through
//! the [`retry::RetryController`], and the [`aggregator`] gathers exactly
//! one [`job::JobResult`] per URL.

pub mod aggregator;
pub mod dispatcher;
pub mod job;
pub mod retry;
pub mod stats;

pub use aggregator::{validate_batch, RequestAggregator};
pub use dispatcher::{Dispatcher, DispatcherHandle, DispatcherOptions};
pub use job::{Job, JobError, JobResult};
pub use retry::{RetryController, RetryDecision};
pub use stats::{LatencyHistogram, LatencyMetrics, PipelineStats, StatsSnapshot};
