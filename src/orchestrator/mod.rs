//! Download Orchestrator: the top-level run coordinator.
//!
//! A run moves through `Init → HierarchyReady → TasksBuilt → Running →
//! Finalizing → Done`. Item failures never stop it; only an unreachable
//! remote, an unwritable checkpoint, or a run-fatal item error (disk full,
//! permission denied, authentication rejected) do.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicBool;
//! use std::time::Duration;
//!
//! use gallery_core::download::HttpTransfer;
//! use gallery_core::hierarchy::{ManifestLocation, ManifestSource};
//! use gallery_core::orchestrator::{Orchestrator, RunConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let source = ManifestSource::new(
//!     ManifestLocation::parse("https://photos.example.com/manifest.json"),
//!     Duration::from_secs(30),
//! )?;
//! let orchestrator = Orchestrator::new(
//!     RunConfig::new("./photos"),
//!     Arc::new(source),
//!     Arc::new(HttpTransfer::new()?),
//! )?;
//! let report = orchestrator.run(Arc::new(AtomicBool::new(false))).await?;
//! println!("{} completed, {} failed", report.completed, report.failed);
//! # Ok(())
//! # }
//! ```

mod bridge;
mod config;
mod plan;
mod report;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheError, CacheInfo, CacheStore};
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::download::{PoolError, Statistics, TaskOutcome, Transfer, WorkerPool};
use crate::filesystem::path_exists;
use crate::hierarchy::{RemoteNode, RemoteSource, SourceError};

use bridge::{CheckpointSink, SourceDownload};

pub use config::{ConfigError, FilterConfig, RunConfig, STATE_DIR_NAME, state_dir_for};
pub use report::{GalleryFailure, ItemFailure, RunReport, RunStatus};

/// Errors that end a run without a report.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The remote hierarchy could not be enumerated at all.
    #[error("failed to enumerate remote hierarchy: {0}")]
    Enumeration(#[source] SourceError),

    /// The checkpoint cannot be opened or written.
    #[error("checkpoint store failed: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("cache store failed: {0}")]
    Cache(#[from] CacheError),

    #[error("worker pool failed: {0}")]
    Pool(#[source] PoolError),
}

/// Orchestration lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    HierarchyReady,
    TasksBuilt,
    Running,
    Finalizing,
    Done,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::HierarchyReady => "hierarchy_ready",
            Self::TasksBuilt => "tasks_built",
            Self::Running => "running",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

fn advance(state: &mut RunState, next: RunState) {
    debug!(from = %state, to = %next, "run state transition");
    *state = next;
}

/// Coordinates enumeration, planning and transfer for one output directory.
pub struct Orchestrator {
    config: RunConfig,
    source: Arc<dyn RemoteSource>,
    transfer: Arc<dyn Transfer>,
    cache: CacheStore,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Binds a validated configuration to a remote source and transfer primitive.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Config`] if `config` fails validation.
    pub fn new(
        config: RunConfig,
        source: Arc<dyn RemoteSource>,
        transfer: Arc<dyn Transfer>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let cache = CacheStore::new(config.cache_dir());
        Ok(Self {
            config,
            source,
            transfer,
            cache,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Runs to completion or cancellation with a fresh [`Statistics`].
    ///
    /// # Errors
    ///
    /// See [`Self::run_with`].
    pub async fn run(&self, cancel: Arc<AtomicBool>) -> Result<RunReport, OrchestratorError> {
        self.run_with(Arc::new(Statistics::new()), cancel).await
    }

    /// Runs with caller-owned statistics so progress can be observed live.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Enumeration`] when the hierarchy cannot be
    /// obtained or a gallery listing is rejected as unauthenticated, and
    /// [`OrchestratorError::Checkpoint`] when the checkpoint cannot be opened
    /// or written. Item failures are reported in the [`RunReport`] instead.
    #[instrument(skip_all, fields(output = %self.config.output_dir.display()))]
    pub async fn run_with(
        &self,
        stats: Arc<Statistics>,
        cancel: Arc<AtomicBool>,
    ) -> Result<RunReport, OrchestratorError> {
        let mut state = RunState::Init;

        if self.config.refresh_cache {
            self.cache.invalidate().await?;
        }
        let tree = self.list_hierarchy(self.config.use_cache).await?;
        advance(&mut state, RunState::HierarchyReady);

        let checkpoint = CheckpointStore::open(&self.config.checkpoint_path()).await?;
        let plan = self.build_plan(&tree, &checkpoint, &stats).await?;
        advance(&mut state, RunState::TasksBuilt);

        let plan::Plan {
            tasks,
            planned_bytes,
            gallery_failures,
        } = plan;
        let gallery_of: HashMap<String, String> = tasks
            .iter()
            .map(|task| (task.item.id.clone(), task.item.gallery_id.clone()))
            .collect();
        let planned = tasks.len();
        stats.add_planned(planned);
        info!(
            planned,
            planned_bytes,
            skipped = stats.skipped(),
            "task list built"
        );

        if self.config.dry_run {
            checkpoint.close().await;
            advance(&mut state, RunState::Finalizing);
            let report = self.finalize(
                &stats,
                RunStatus::Completed,
                planned_bytes,
                gallery_failures,
                Vec::new(),
            );
            advance(&mut state, RunState::Done);
            return Ok(report);
        }

        let pool = WorkerPool::new(self.config.concurrency, self.config.retry_policy())
            .map_err(OrchestratorError::Pool)?
            .with_integrity(self.config.verify_integrity)
            .with_cancel_grace(self.config.cancel_grace);
        let download = Arc::new(SourceDownload::new(
            Arc::clone(&self.source),
            Arc::clone(&self.transfer),
            self.config.transfer_timeout,
        ));
        let sink = Arc::new(CheckpointSink::new(
            checkpoint.clone(),
            self.config.preserve_timestamps,
        ));

        advance(&mut state, RunState::Running);
        let pool_result = pool
            .run(tasks, download, sink, Arc::clone(&stats), cancel)
            .await;
        checkpoint.close().await;
        let pool_report = match pool_result {
            Ok(report) => report,
            Err(PoolError::Record { source, .. }) => return Err(source.into()),
            Err(other) => return Err(OrchestratorError::Pool(other)),
        };

        advance(&mut state, RunState::Finalizing);
        let failures = pool_report
            .outcomes
            .iter()
            .filter_map(|(item_id, outcome)| match outcome {
                TaskOutcome::Failed { kind, .. } => Some(ItemFailure {
                    item_id: item_id.clone(),
                    gallery_id: gallery_of.get(item_id).cloned().unwrap_or_default(),
                    kind: *kind,
                }),
                _ => None,
            })
            .collect();
        let status = match pool_report.aborted {
            Some(abort) => {
                warn!(item_id = %abort.item_id, kind = %abort.kind, "run aborted");
                RunStatus::Aborted {
                    kind: abort.kind,
                    message: abort.message,
                }
            }
            None if pool_report.cancelled => RunStatus::Cancelled,
            None => RunStatus::Completed,
        };
        let report = self.finalize(&stats, status, planned_bytes, gallery_failures, failures);
        advance(&mut state, RunState::Done);
        Ok(report)
    }

    /// Returns the hierarchy, from the cache when allowed and fresh.
    ///
    /// A remote enumeration repopulates the cache; a failed cache write is
    /// logged and does not fail the call.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Enumeration`] if the remote cannot be
    /// enumerated or returns a malformed tree.
    #[instrument(skip(self))]
    pub async fn list_hierarchy(&self, use_cache: bool) -> Result<RemoteNode, OrchestratorError> {
        if use_cache && let Some(entry) = self.cache.load().await {
            info!(captured_at = entry.captured_at, "using cached hierarchy");
            return Ok(entry.tree);
        }

        info!("enumerating remote hierarchy");
        let tree = self
            .source
            .fetch_hierarchy()
            .await
            .and_then(RemoteNode::validated)
            .map_err(OrchestratorError::Enumeration)?;
        if let Err(e) = self.cache.store(&tree, self.config.cache_ttl_hours).await {
            warn!(error = %e, "failed to cache hierarchy");
        }
        Ok(tree)
    }

    /// Removes the cached hierarchy and item listings.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Cache`] if an existing file cannot be removed.
    pub async fn clear_cache(&self) -> Result<(), OrchestratorError> {
        self.cache.invalidate().await?;
        info!("cache cleared");
        Ok(())
    }

    /// Deletes every checkpoint record, returning how many were removed.
    ///
    /// A missing checkpoint database is left uncreated.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Checkpoint`] if the store cannot be opened or cleared.
    pub async fn clear_checkpoint(&self) -> Result<u64, OrchestratorError> {
        let path = self.config.checkpoint_path();
        if !path_exists(&path).await {
            return Ok(0);
        }
        let checkpoint = CheckpointStore::open(&path).await?;
        let removed = checkpoint.clear().await;
        checkpoint.close().await;
        let removed = removed?;
        info!(removed, "checkpoint cleared");
        Ok(removed)
    }

    pub async fn cache_info(&self) -> CacheInfo {
        self.cache.info().await
    }

    fn finalize(
        &self,
        stats: &Statistics,
        status: RunStatus,
        planned_bytes: u64,
        gallery_failures: Vec<GalleryFailure>,
        failures: Vec<ItemFailure>,
    ) -> RunReport {
        let elapsed = stats.finish();
        let snapshot = stats.snapshot();
        let report = RunReport {
            status,
            completed: snapshot.completed,
            failed: snapshot.failed,
            skipped: snapshot.skipped,
            retried: snapshot.retried,
            bytes_total: snapshot.bytes,
            elapsed,
            planned: snapshot.planned,
            planned_bytes,
            dry_run: self.config.dry_run,
            failures,
            gallery_failures,
            galleries: stats.galleries(),
        };
        info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            bytes = report.bytes_total,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "run finished"
        );
        report
    }
}
