//! [`RemoteSource`] backed by a JSON manifest on disk or over HTTP.
//!
//! A manifest is an exported listing of the account:
//!
//! ```json
//! {
//!   "base_url": "https://photos.example.com/",
//!   "root": { "id": "root", "title": "Account", "kind": "folder", "children": [] },
//!   "items": { "g1": [ { "id": "p1", "gallery_id": "g1", "file_name": "a.jpg", "url": "p/a.jpg" } ] }
//! }
//! ```
//!
//! Relative item URLs are joined onto `base_url`, or onto the manifest URL
//! when the manifest itself was fetched over HTTP.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, instrument};
use url::Url;

use super::{RemoteItem, RemoteNode, RemoteSource, ResolvedUrl, SourceError};
use crate::download::CONNECT_TIMEOUT_SECS;

/// On-disk/over-the-wire manifest layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Base for relative item URLs.
    #[serde(default)]
    pub base_url: Option<String>,
    pub root: RemoteNode,
    /// Items keyed by gallery id.
    #[serde(default)]
    pub items: HashMap<String, Vec<RemoteItem>>,
}

/// Where a manifest is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLocation {
    File(PathBuf),
    Url(Url),
}

impl ManifestLocation {
    /// Treats `http(s)://` inputs as URLs and anything else as a path.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if (trimmed.starts_with("http://") || trimmed.starts_with("https://"))
            && let Ok(url) = Url::parse(trimmed)
        {
            return Self::Url(url);
        }
        Self::File(PathBuf::from(trimmed))
    }

    fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Url(url) => url.to_string(),
        }
    }
}

#[derive(Debug)]
struct LoadedManifest {
    root: RemoteNode,
    items: HashMap<String, Vec<RemoteItem>>,
    base: Option<Url>,
    /// Item id -> (gallery id, index in that gallery's list).
    index: HashMap<String, (String, usize)>,
}

/// Remote source reading a [`Manifest`].
#[derive(Debug)]
pub struct ManifestSource {
    location: ManifestLocation,
    client: Client,
    loaded: OnceCell<LoadedManifest>,
}

impl ManifestSource {
    /// Creates a source for `location`. Nothing is read until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Network`] if the HTTP client cannot be built.
    pub fn new(location: ManifestLocation, request_timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(request_timeout)
            .gzip(true)
            .build()
            .map_err(|e| SourceError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            location,
            client,
            loaded: OnceCell::new(),
        })
    }

    async fn loaded(&self) -> Result<&LoadedManifest, SourceError> {
        self.loaded.get_or_try_init(|| self.load()).await
    }

    #[instrument(skip(self), fields(location = %self.location.describe()))]
    async fn load(&self) -> Result<LoadedManifest, SourceError> {
        let raw = match &self.location {
            ManifestLocation::File(path) => tokio::fs::read(path).await.map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SourceError::not_found("manifest", path.display().to_string())
                } else {
                    SourceError::network(format!("failed to read {}: {e}", path.display()))
                }
            })?,
            ManifestLocation::Url(url) => self.fetch(url).await?,
        };

        let manifest: Manifest = serde_json::from_slice(&raw)
            .map_err(|e| SourceError::malformed(format!("invalid manifest JSON: {e}")))?;

        let base = match (&manifest.base_url, &self.location) {
            (Some(base), _) => Some(
                Url::parse(base)
                    .map_err(|e| SourceError::malformed(format!("invalid base_url {base}: {e}")))?,
            ),
            (None, ManifestLocation::Url(url)) => Some(url.clone()),
            (None, ManifestLocation::File(_)) => None,
        };

        let root = manifest.root.validated()?;
        let mut index = HashMap::new();
        for (gallery_id, items) in &manifest.items {
            for (position, item) in items.iter().enumerate() {
                if item.gallery_id != *gallery_id {
                    return Err(SourceError::malformed(format!(
                        "item {} listed under gallery {gallery_id} but owned by {}",
                        item.id, item.gallery_id
                    )));
                }
                if index
                    .insert(item.id.clone(), (gallery_id.clone(), position))
                    .is_some()
                {
                    return Err(SourceError::malformed(format!(
                        "duplicate item id {}",
                        item.id
                    )));
                }
            }
        }

        debug!(
            galleries = root.gallery_count(),
            items = index.len(),
            "manifest loaded"
        );

        Ok(LoadedManifest {
            root,
            items: manifest.items,
            base,
            index,
        })
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, SourceError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| SourceError::network(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(
                status.as_u16(),
                "manifest",
                url.as_str(),
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::network(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl RemoteSource for ManifestSource {
    async fn fetch_hierarchy(&self) -> Result<RemoteNode, SourceError> {
        Ok(self.loaded().await?.root.clone())
    }

    async fn fetch_gallery_items(&self, gallery_id: &str) -> Result<Vec<RemoteItem>, SourceError> {
        let loaded = self.loaded().await?;
        if let Some(items) = loaded.items.get(gallery_id) {
            return Ok(items.clone());
        }
        match loaded.root.find(gallery_id) {
            Some(node) if node.kind.holds_items() => Ok(Vec::new()),
            _ => Err(SourceError::not_found("gallery", gallery_id)),
        }
    }

    async fn resolve_download_url(&self, item_id: &str) -> Result<ResolvedUrl, SourceError> {
        let loaded = self.loaded().await?;
        let item = loaded
            .index
            .get(item_id)
            .and_then(|(gallery_id, position)| loaded.items.get(gallery_id)?.get(*position))
            .ok_or_else(|| SourceError::not_found("item", item_id))?;
        let raw = item
            .url
            .as_deref()
            .ok_or_else(|| SourceError::malformed(format!("item {item_id} has no URL")))?;

        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = loaded.base.as_ref().ok_or_else(|| {
                    SourceError::malformed(format!(
                        "item {item_id} has relative URL {raw} and the manifest has no base_url"
                    ))
                })?;
                base.join(raw)
                    .map_err(|e| SourceError::malformed(format!("invalid URL {raw}: {e}")))?
            }
            Err(e) => return Err(SourceError::malformed(format!("invalid URL {raw}: {e}"))),
        };

        Ok(ResolvedUrl {
            url: url.to_string(),
            expires_at: item.url_expires_at,
        })
    }
}
