//! Adapters plugging the remote source and checkpoint into the worker pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::clock::unix_now;
use crate::download::{DownloadError, DownloadTask, ItemDownload, OutcomeSink, TaskOutcome, Transfer};
use crate::filesystem::set_timestamp;
use crate::hierarchy::RemoteSource;

/// Resolves a fresh URL on every attempt, then transfers it.
pub(super) struct SourceDownload {
    source: Arc<dyn RemoteSource>,
    transfer: Arc<dyn Transfer>,
    timeout: Duration,
}

impl SourceDownload {
    pub(super) fn new(
        source: Arc<dyn RemoteSource>,
        transfer: Arc<dyn Transfer>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            transfer,
            timeout,
        }
    }
}

#[async_trait]
impl ItemDownload for SourceDownload {
    async fn download(&self, task: &DownloadTask) -> Result<u64, DownloadError> {
        let resolved = self
            .source
            .resolve_download_url(task.item_id())
            .await
            .map_err(|e| DownloadError::resolve(task.item_id(), e))?;
        if resolved.is_expired_at(unix_now()) {
            debug!(item_id = %task.item_id(), "resolved URL already past its expiry");
        }
        self.transfer
            .transfer(&resolved.url, &task.destination, self.timeout)
            .await
    }
}

/// Persists outcomes and applies original timestamps to completed files.
pub(super) struct CheckpointSink {
    checkpoint: CheckpointStore,
    preserve_timestamps: bool,
}

impl CheckpointSink {
    pub(super) fn new(checkpoint: CheckpointStore, preserve_timestamps: bool) -> Self {
        Self {
            checkpoint,
            preserve_timestamps,
        }
    }
}

#[async_trait]
impl OutcomeSink for CheckpointSink {
    async fn record(
        &self,
        task: &DownloadTask,
        outcome: &TaskOutcome,
    ) -> Result<(), CheckpointError> {
        if self.preserve_timestamps
            && matches!(outcome, TaskOutcome::Completed { .. })
            && let Some(taken_at) = task.item.taken_at
            && let Err(e) = set_timestamp(&task.destination, taken_at).await
        {
            warn!(path = %task.destination.display(), error = %e, "failed to set timestamp");
        }
        self.checkpoint
            .record(task.item_id(), &task.item.gallery_id, outcome)
            .await
    }
}
