//! `HierarchyReady → TasksBuilt`: flatten, filter and subtract.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::{GalleryFailure, Orchestrator, OrchestratorError};
use crate::checkpoint::CheckpointStore;
use crate::download::{DownloadTask, IntegrityVerifier, SkipReason, Statistics, TaskOutcome};
use crate::failure::ErrorScope;
use crate::filesystem::{DestinationMap, path_exists};
use crate::hierarchy::{RemoteItem, RemoteNode, SourceError};

/// The work list handed to the worker pool.
#[derive(Debug, Default)]
pub(super) struct Plan {
    pub(super) tasks: Vec<DownloadTask>,
    pub(super) planned_bytes: u64,
    pub(super) gallery_failures: Vec<GalleryFailure>,
}

/// Which checkpointed items to leave out, or keep exclusively.
enum Selection {
    /// Drop completed items.
    SkipCompleted(HashSet<String>),
    /// Keep only previously failed items.
    FailedOnly(HashSet<String>),
    /// Take everything.
    All,
}

impl Orchestrator {
    pub(super) async fn build_plan(
        &self,
        tree: &RemoteNode,
        checkpoint: &CheckpointStore,
        stats: &Statistics,
    ) -> Result<Plan, OrchestratorError> {
        let galleries = self
            .config
            .gallery_filter()
            .select(tree)
            .map_err(OrchestratorError::Enumeration)?;
        info!(galleries = galleries.len(), "galleries selected");

        let selection = if self.config.overwrite {
            Selection::All
        } else if self.config.retry_failed_only {
            let failed = checkpoint.failed_items().await?;
            Selection::FailedOnly(failed.into_iter().map(|record| record.item_id).collect())
        } else {
            Selection::SkipCompleted(checkpoint.load_skip_set().await?)
        };

        let verifier = IntegrityVerifier;
        let mut plan = Plan::default();
        let mut seen = HashSet::new();
        let mut destinations = DestinationMap::default();

        for gallery in galleries {
            let dir = destinations.gallery_dir(&self.config.output_dir, gallery);
            let items = match self.gallery_items(gallery).await {
                Ok(items) => items,
                Err(e) if e.kind().scope() == ErrorScope::Run => {
                    return Err(OrchestratorError::Enumeration(e));
                }
                Err(e) => {
                    warn!(gallery_id = %gallery.id, error = %e, "skipping gallery");
                    plan.gallery_failures.push(GalleryFailure {
                        gallery_id: gallery.id.clone(),
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            for item in items {
                if item.gallery_id != gallery.id {
                    warn!(
                        item_id = %item.id,
                        gallery_id = %gallery.id,
                        owner = %item.gallery_id,
                        "ignoring item listed under a foreign gallery"
                    );
                    continue;
                }
                if !seen.insert(item.id.clone()) {
                    debug!(item_id = %item.id, "duplicate item id, keeping first");
                    continue;
                }
                // Every listed item claims its path, skipped ones included.
                let destination = destinations.claim(&dir, &item);

                match &selection {
                    Selection::SkipCompleted(done) if done.contains(&item.id) => {
                        let outcome = TaskOutcome::Skipped {
                            reason: SkipReason::AlreadyCompleted,
                        };
                        stats.record_outcome(&item.gallery_id, &outcome);
                        continue;
                    }
                    Selection::FailedOnly(failed) if !failed.contains(&item.id) => continue,
                    _ => {}
                }

                if !self.config.overwrite
                    && self.existing_file_verifies(&verifier, &destination, &item).await
                {
                    let outcome = TaskOutcome::Skipped {
                        reason: SkipReason::AlreadyExists,
                    };
                    if !self.config.dry_run {
                        checkpoint
                            .record(&item.id, &item.gallery_id, &outcome)
                            .await?;
                    }
                    stats.record_outcome(&item.gallery_id, &outcome);
                    continue;
                }

                plan.planned_bytes += item.size.unwrap_or(0);
                plan.tasks.push(DownloadTask::new(item, destination));
            }
        }

        Ok(plan)
    }

    /// Items of one gallery, from the cache when allowed and fresh.
    async fn gallery_items(&self, gallery: &RemoteNode) -> Result<Vec<RemoteItem>, SourceError> {
        if self.config.use_cache
            && let Some(items) = self.cache.load_items(&gallery.id).await
        {
            debug!(gallery_id = %gallery.id, items = items.len(), "using cached listing");
            return Ok(items);
        }

        let items = self.source.fetch_gallery_items(&gallery.id).await?;
        if let Err(e) = self
            .cache
            .store_items(&gallery.id, &items, self.config.cache_ttl_hours)
            .await
        {
            warn!(gallery_id = %gallery.id, error = %e, "failed to cache gallery listing");
        }
        Ok(items)
    }

    /// Whether `destination` already holds a good copy of `item`.
    async fn existing_file_verifies(
        &self,
        verifier: &IntegrityVerifier,
        destination: &std::path::Path,
        item: &RemoteItem,
    ) -> bool {
        if !path_exists(destination).await {
            return false;
        }
        let signature = if self.config.verify_integrity {
            item.signature.as_deref()
        } else {
            None
        };
        match verifier.verify(destination, item.size, signature).await {
            Ok(verification) if verification.is_ok() => true,
            Ok(_) => {
                debug!(path = %destination.display(), "existing file fails verification, redownloading");
                false
            }
            Err(e) => {
                warn!(path = %destination.display(), error = %e, "cannot verify existing file");
                false
            }
        }
    }
}
