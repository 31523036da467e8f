//! Dispatcher and worker pool
//!
//! ```text
//! submit ──▶ job queue ──┐
//!                        ├──▶ worker 0..N ──▶ RetryController ──▶ result sink
//!            retry lane ─┘            ▲               │
//!                                     └───────────────┘ failed, attempts left
//! ```
//!
//! Workers take from the retry lane first, so each worker re-enqueues at
//! most one job before pulling again and the lane never fills. Shutdown
//! closes the job queue; workers keep going until the queue is drained
//! and no job is waiting for another attempt.

use crate::capture::orchestrator::SESSION_CLOSE_GRACE;
use crate::capture::Capture;
use crate::config::Config;
use crate::error::DispatchError;
use crate::pipeline::job::Job;
use crate::pipeline::retry::RetryController;
use crate::pipeline::stats::PipelineStats;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, Instrument};

/// How often an idle worker re-checks for outstanding retries while draining
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherOptions {
    /// Concurrent workers
    pub worker_count: usize,
    /// Attempts per job including the first
    pub max_attempts: u32,
    /// Outer bound of one attempt, enforced by the retry controller
    pub attempt_timeout: Duration,
}

impl Default for DispatcherOptions {
    fn default() -> Self {
        Self {
            worker_count: 2,
            max_attempts: 2,
            attempt_timeout: Duration::from_secs(90) + SESSION_CLOSE_GRACE,
        }
    }
}

impl DispatcherOptions {
    /// Derive pool settings from the service configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            worker_count: config.effective_worker_count(),
            max_attempts: config.effective_max_attempts(),
            attempt_timeout: config.job_timeout() + SESSION_CLOSE_GRACE,
        }
    }

    /// Capacity of the job queue and of the retry lane
    pub fn queue_capacity(&self) -> usize {
        (self.worker_count.max(1) * self.max_attempts.max(1) as usize).max(1)
    }
}

struct SourceInner {
    jobs: mpsc::Receiver<Job>,
    retries: mpsc::Receiver<Job>,
    shutdown: watch::Receiver<bool>,
    closing: bool,
    jobs_drained: bool,
}

/// The queues workers pull from
struct JobSource {
    inner: Mutex<SourceInner>,
    stats: Arc<PipelineStats>,
}

impl JobSource {
    /// Next job for a worker, `None` once the pool should stop
    async fn next(&self) -> Option<Job> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        loop {
            tokio::select! {
                biased;

                Some(job) = inner.retries.recv() => return Some(job),

                changed = inner.shutdown.changed(), if !inner.closing => {
                    if changed.is_err() || *inner.shutdown.borrow() {
                        debug!("Job queue closing");
                        inner.closing = true;
                        inner.jobs.close();
                    }
                }

                job = inner.jobs.recv(), if !inner.jobs_drained => match job {
                    Some(job) => return Some(job),
                    None => inner.jobs_drained = true,
                },

                _ = sleep(DRAIN_POLL_INTERVAL), if inner.jobs_drained => {
                    if self.stats.in_flight() == 0 {
                        return None;
                    }
                }
            }
        }
    }
}

/// Cloneable submission handle
#[derive(Clone)]
pub struct DispatcherHandle {
    jobs: mpsc::Sender<Job>,
    shutdown: Arc<watch::Sender<bool>>,
    stats: Arc<PipelineStats>,
}

impl DispatcherHandle {
    /// Queue a job, waiting for room when the queue is full.
    ///
    /// The job only counts as in flight once a queue slot is held, so
    /// dropping this future while it waits leaves no trace.
    pub async fn submit(&self, job: Job) -> Result<(), DispatchError> {
        if self.is_closed() {
            return Err(DispatchError::Closed);
        }
        let permit = self.jobs.reserve().await.map_err(|_| DispatchError::Closed)?;
        self.stats.job_submitted();
        permit.send(job);
        Ok(())
    }

    /// Stop accepting jobs. Queued and retried jobs still run to completion.
    pub fn close(&self) {
        self.shutdown.send_replace(true);
    }

    /// Jobs waiting in the queue
    pub fn queue_depth(&self) -> usize {
        self.jobs.max_capacity() - self.jobs.capacity()
    }

    /// Whether the dispatcher stopped accepting jobs
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow() || self.jobs.is_closed()
    }

    /// Shared pipeline counters
    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }
}

/// Owns the worker pool
pub struct Dispatcher {
    handle: DispatcherHandle,
    workers: Vec<JoinHandle<()>>,
    options: DispatcherOptions,
}

impl Dispatcher {
    /// Spawn the workers. Must be called inside a Tokio runtime.
    pub fn start(options: DispatcherOptions, capture: Arc<dyn Capture>) -> Self {
        let worker_count = options.worker_count.max(1);
        let capacity = options.queue_capacity();
        let stats = Arc::new(PipelineStats::new());

        let (jobs_tx, jobs_rx) = mpsc::channel(capacity);
        let (retry_tx, retry_rx) = mpsc::channel(capacity);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let source = Arc::new(JobSource {
            inner: Mutex::new(SourceInner {
                jobs: jobs_rx,
                retries: retry_rx,
                shutdown: shutdown_rx,
                closing: false,
                jobs_drained: false,
            }),
            stats: stats.clone(),
        });
        let controller = Arc::new(RetryController::new(
            capture,
            options.max_attempts,
            options.attempt_timeout,
            retry_tx,
            stats.clone(),
        ));

        let workers = (0..worker_count)
            .map(|id| {
                let source = source.clone();
                let controller = controller.clone();
                tokio::spawn(
                    async move {
                        debug!("Worker started");
                        let mut handled = 0u64;
                        while let Some(job) = source.next().await {
                            controller.run(job).await;
                            handled += 1;
                        }
                        debug!("Worker stopped after {} attempts", handled);
                    }
                    .instrument(tracing::info_span!("worker", worker = id)),
                )
            })
            .collect();

        info!(
            "Dispatcher started: {} workers, queue capacity {}, {} attempts per job",
            worker_count, capacity, options.max_attempts
        );

        Self {
            handle: DispatcherHandle {
                jobs: jobs_tx,
                shutdown: Arc::new(shutdown_tx),
                stats,
            },
            workers,
            options,
        }
    }

    /// A submission handle
    pub fn handle(&self) -> DispatcherHandle {
        self.handle.clone()
    }

    /// Shared pipeline counters
    pub fn stats(&self) -> Arc<PipelineStats> {
        self.handle.stats()
    }

    /// Settings in use
    pub fn options(&self) -> &DispatcherOptions {
        &self.options
    }

    /// Stop accepting jobs, finish queued and retried ones, join workers
    pub async fn shutdown(self) {
        info!("Dispatcher shutting down");
        self.handle.close();
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Worker task failed: {}", e);
            }
        }
        info!("Dispatcher stopped");
    }
}
