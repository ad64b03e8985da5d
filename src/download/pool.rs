//! Worker Pool: bounded-concurrency execution of [`DownloadTask`]s.
//!
//! # Concurrency Model
//!
//! - The coordinator acquires a semaphore permit before spawning each task, so
//!   at most `concurrency` transfers run at once.
//! - A task that has to back off releases its permit while sleeping and
//!   re-acquires one afterwards. Sleeping tasks never hold a slot, and the next
//!   queued task starts in their place.
//! - Each task reports its terminal outcome through the [`OutcomeSink`] and the
//!   [`Statistics`] as soon as it has one.
//!
//! # Cancellation
//!
//! The run-scoped cancel flag is polled while waiting for permits and while
//! backing off. Once set, no new task starts, tasks in backoff are abandoned
//! without an outcome, and in-flight transfers get a grace period before they
//! are aborted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::constants::{DEFAULT_CANCEL_GRACE, MAX_CONCURRENCY};
use super::integrity::{IntegrityVerifier, Verification};
use super::retry::{RetryDecision, RetryPolicy};
use super::{DownloadError, DownloadTask, Statistics, TaskOutcome};
use crate::checkpoint::CheckpointError;
use crate::failure::{ErrorKind, ErrorScope};

const MIN_CONCURRENCY: usize = 1;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Error type for worker pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency { value: usize },

    /// An outcome could not be persisted; the run cannot promise resumability.
    #[error("failed to record outcome for item {item_id}: {source}")]
    Record {
        item_id: String,
        #[source]
        source: CheckpointError,
    },

    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// The externally supplied item download: resolve a URL and transfer it.
#[async_trait]
pub trait ItemDownload: Send + Sync {
    /// Performs one attempt for `task`, returning bytes written.
    async fn download(&self, task: &DownloadTask) -> Result<u64, DownloadError>;
}

/// Receives each terminal outcome before it is counted.
#[async_trait]
pub trait OutcomeSink: Send + Sync {
    /// Must be durable when it returns `Ok`.
    async fn record(&self, task: &DownloadTask, outcome: &TaskOutcome)
    -> Result<(), CheckpointError>;
}

/// An item failure that makes continuing pointless (disk full, auth rejected).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunAbort {
    pub item_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// What the pool produced for one batch.
#[derive(Debug, Default)]
pub struct PoolReport {
    /// Terminal outcomes in the order they were produced.
    pub outcomes: Vec<(String, TaskOutcome)>,
    /// Whether the cancel flag stopped the batch early.
    pub cancelled: bool,
    /// Set when a run-fatal item error stopped the batch.
    pub aborted: Option<RunAbort>,
}

/// Bounded-concurrency executor with per-task retry.
#[derive(Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    retry_policy: RetryPolicy,
    verify_integrity: bool,
    cancel_grace: Duration,
}

/// State shared by the coordinator and all spawned tasks of one batch.
struct BatchContext {
    semaphore: Arc<Semaphore>,
    retry_policy: RetryPolicy,
    verifier: Option<IntegrityVerifier>,
    download: Arc<dyn ItemDownload>,
    sink: Arc<dyn OutcomeSink>,
    stats: Arc<Statistics>,
    cancel: Arc<AtomicBool>,
    halt: AtomicBool,
    aborted: OnceLock<RunAbort>,
    record_error: std::sync::Mutex<Option<PoolError>>,
}

impl BatchContext {
    fn should_stop(&self) -> bool {
        self.cancel.load(Ordering::SeqCst) || self.halt.load(Ordering::SeqCst)
    }

    fn trip(&self) {
        self.halt.store(true, Ordering::SeqCst);
    }
}

impl WorkerPool {
    /// Creates a pool running at most `concurrency` transfers at once.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConcurrency`] outside 1..=20.
    pub fn new(concurrency: usize, retry_policy: RetryPolicy) -> Result<Self, PoolError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(PoolError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            retry_policy,
            verify_integrity: true,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        })
    }

    /// Enables or disables post-transfer integrity checks.
    #[must_use]
    pub fn with_integrity(mut self, verify: bool) -> Self {
        self.verify_integrity = verify;
        self
    }

    /// How long in-flight transfers may run after cancellation.
    #[must_use]
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Runs `tasks` to completion or cancellation.
    ///
    /// Item failures become [`TaskOutcome::Failed`] entries. A run-fatal item
    /// failure stops the batch and is reported in [`PoolReport::aborted`].
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Record`] if the sink rejects an outcome; the batch
    /// stops at that point.
    #[allow(clippy::too_many_lines)]
    #[instrument(skip_all, fields(tasks = tasks.len(), concurrency = self.concurrency))]
    pub async fn run(
        &self,
        tasks: Vec<DownloadTask>,
        download: Arc<dyn ItemDownload>,
        sink: Arc<dyn OutcomeSink>,
        stats: Arc<Statistics>,
        cancel: Arc<AtomicBool>,
    ) -> Result<PoolReport, PoolError> {
        let ctx = Arc::new(BatchContext {
            semaphore: Arc::clone(&self.semaphore),
            retry_policy: self.retry_policy.clone(),
            verifier: self.verify_integrity.then_some(IntegrityVerifier),
            download,
            sink,
            stats,
            cancel,
            halt: AtomicBool::new(false),
            aborted: OnceLock::new(),
            record_error: std::sync::Mutex::new(None),
        });
        let mut report = PoolReport::default();
        let mut handles: Vec<(String, JoinHandle<Option<TaskOutcome>>)> = Vec::new();

        info!("starting worker pool");

        for task in tasks {
            if ctx.should_stop() {
                break;
            }
            drain_finished(&mut handles, &mut report).await;

            let Some(permit) = acquire_or_stop(&ctx).await? else {
                break;
            };

            let item_id = task.item.id.clone();
            let task_ctx = Arc::clone(&ctx);
            handles.push((
                item_id,
                tokio::spawn(async move { run_task(task, permit, task_ctx).await }),
            ));
        }

        if ctx.should_stop() {
            let deadline = tokio::time::Instant::now() + self.cancel_grace;
            debug!(in_flight = handles.len(), "stopping, waiting for in-flight tasks");
            for (id, mut handle) in handles {
                let now = tokio::time::Instant::now();
                if now >= deadline {
                    handle.abort();
                    continue;
                }
                match tokio::time::timeout(deadline - now, &mut handle).await {
                    Ok(joined) => collect(id, joined, &mut report),
                    Err(_) => {
                        debug!(item_id = %id, "aborting task after grace period");
                        handle.abort();
                    }
                }
            }
        } else {
            for (id, handle) in handles {
                collect(id, handle.await, &mut report);
            }
        }

        let record_error = ctx
            .record_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(error) = record_error {
            return Err(error);
        }

        report.aborted = ctx.aborted.get().cloned();
        report.cancelled = report.aborted.is_none() && ctx.cancel.load(Ordering::SeqCst);

        info!(
            outcomes = report.outcomes.len(),
            cancelled = report.cancelled,
            aborted = report.aborted.is_some(),
            "worker pool finished"
        );
        Ok(report)
    }
}

/// Waits for a permit, giving up when the batch is told to stop.
async fn acquire_or_stop(ctx: &BatchContext) -> Result<Option<OwnedSemaphorePermit>, PoolError> {
    tokio::select! {
        biased;
        () = wait_for_stop(ctx) => Ok(None),
        result = Arc::clone(&ctx.semaphore).acquire_owned() => {
            result.map(Some).map_err(|_| PoolError::SemaphoreClosed)
        }
    }
}

async fn wait_for_stop(ctx: &BatchContext) {
    while !ctx.should_stop() {
        tokio::time::sleep(CANCEL_POLL_INTERVAL).await;
    }
}

/// Sleeps `delay` unless the batch stops first. Returns false when stopped.
async fn backoff(ctx: &BatchContext, delay: Duration) -> bool {
    tokio::select! {
        biased;
        () = wait_for_stop(ctx) => false,
        () = tokio::time::sleep(delay) => !ctx.should_stop(),
    }
}

fn collect(
    id: String,
    joined: Result<Option<TaskOutcome>, tokio::task::JoinError>,
    report: &mut PoolReport,
) {
    match joined {
        Ok(Some(outcome)) => report.outcomes.push((id, outcome)),
        Ok(None) => debug!(item_id = %id, "task abandoned"),
        Err(e) if e.is_cancelled() => debug!(item_id = %id, "task aborted"),
        Err(e) => warn!(item_id = %id, error = %e, "download task panicked"),
    }
}

async fn drain_finished(
    handles: &mut Vec<(String, JoinHandle<Option<TaskOutcome>>)>,
    report: &mut PoolReport,
) {
    let mut idx = 0;
    while idx < handles.len() {
        if handles[idx].1.is_finished() {
            let (id, handle) = handles.swap_remove(idx);
            collect(id, handle.await, report);
        } else {
            idx += 1;
        }
    }
}

/// Drives one task through its attempts. `None` means abandoned on stop.
#[instrument(skip_all, fields(item_id = %task.item.id))]
async fn run_task(
    mut task: DownloadTask,
    permit: OwnedSemaphorePermit,
    ctx: Arc<BatchContext>,
) -> Option<TaskOutcome> {
    let started = Instant::now();
    let mut permit = Some(permit);
    ctx.stats.increment_attempted();

    let outcome = loop {
        if permit.is_none() {
            permit = acquire_or_stop(&ctx).await.ok().flatten();
            if permit.is_none() {
                return None;
            }
        }

        task.attempt += 1;
        debug!(attempt = task.attempt, "attempting download");

        let error = match attempt_once(&ctx, &task).await {
            Ok(bytes_written) => {
                break TaskOutcome::Completed {
                    bytes_written,
                    duration: started.elapsed(),
                };
            }
            Err(error) => error,
        };

        let kind = error.kind();
        if kind.scope() == ErrorScope::Run {
            warn!(attempt = task.attempt, %kind, error = %error, "run-fatal failure");
            let _ = ctx.aborted.set(RunAbort {
                item_id: task.item.id.clone(),
                kind,
                message: error.to_string(),
            });
            ctx.trip();
            break TaskOutcome::Failed {
                kind,
                attempts: task.attempt,
            };
        }

        match ctx
            .retry_policy
            .decide(kind, task.attempt, error.retry_after())
        {
            RetryDecision::Retry { delay, attempt } => {
                info!(
                    attempt,
                    delay_ms = delay.as_millis(),
                    error = %error,
                    "retrying download"
                );
                task.current_delay = delay;
                ctx.stats.increment_retried();
                drop(permit.take());
                if !backoff(&ctx, delay).await {
                    debug!("abandoning retry on stop");
                    return None;
                }
            }
            RetryDecision::GiveUp { reason } => {
                warn!(
                    attempts = task.attempt,
                    %kind,
                    error = %error,
                    %reason,
                    "download failed"
                );
                break TaskOutcome::Failed {
                    kind,
                    attempts: task.attempt,
                };
            }
        }
    };

    if let Err(source) = ctx.sink.record(&task, &outcome).await {
        warn!(error = %source, "failed to record outcome");
        let mut slot = ctx
            .record_error
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(PoolError::Record {
                item_id: task.item.id.clone(),
                source,
            });
        }
        ctx.trip();
        return None;
    }
    ctx.stats.record_outcome(&task.item.gallery_id, &outcome);
    drop(permit);
    Some(outcome)
}

/// One transfer attempt followed by verification.
async fn attempt_once(ctx: &BatchContext, task: &DownloadTask) -> Result<u64, DownloadError> {
    let bytes = ctx.download.download(task).await?;

    if let Some(verifier) = &ctx.verifier {
        let verification = verifier
            .verify(
                &task.destination,
                task.item.size,
                task.item.signature.as_deref(),
            )
            .await
            .map_err(|e| DownloadError::io(&task.destination, e))?;
        if let Verification::Mismatch { details } = verification {
            let _ = tokio::fs::remove_file(&task.destination).await;
            return Err(DownloadError::integrity(&task.destination, details));
        }
    }
    Ok(bytes)
}
