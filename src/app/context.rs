//! Builds the orchestrator the commands operate on.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use gallery_core::hierarchy::ResolvedUrl;
use gallery_core::orchestrator::RunConfig;
use gallery_core::{
    HttpTransfer, ManifestLocation, ManifestSource, Orchestrator, RemoteItem, RemoteNode,
    RemoteSource, SourceError,
};

use crate::cli::RunArgs;

const MISSING_SOURCE_MESSAGE: &str =
    "no manifest configured; pass --source FILE|URL or set `source` in the config file";

/// Stand-in for commands that work from local state only.
struct MissingSource;

#[async_trait]
impl RemoteSource for MissingSource {
    async fn fetch_hierarchy(&self) -> Result<RemoteNode, SourceError> {
        Err(SourceError::malformed(MISSING_SOURCE_MESSAGE))
    }

    async fn fetch_gallery_items(&self, _gallery_id: &str) -> Result<Vec<RemoteItem>, SourceError> {
        Err(SourceError::malformed(MISSING_SOURCE_MESSAGE))
    }

    async fn resolve_download_url(&self, _item_id: &str) -> Result<ResolvedUrl, SourceError> {
        Err(SourceError::malformed(MISSING_SOURCE_MESSAGE))
    }
}

pub(crate) fn build_orchestrator(args: &RunArgs, config: RunConfig) -> Result<Orchestrator> {
    let source: Arc<dyn RemoteSource> = match args.source.as_deref() {
        Some(raw) => Arc::new(
            ManifestSource::new(ManifestLocation::parse(raw), Duration::from_secs(args.timeout))
                .context("Failed to prepare manifest source")?,
        ),
        None => Arc::new(MissingSource),
    };
    let transfer = HttpTransfer::new().context("Failed to build HTTP client")?;
    Orchestrator::new(config, source, Arc::new(transfer)).context("Invalid run configuration")
}
