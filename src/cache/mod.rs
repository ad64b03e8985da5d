//! Hierarchy snapshot cache with expiry.
//!
//! The cache directory holds one `hierarchy.json` snapshot plus one file per
//! gallery listing under `items/`. Every file records its capture time and
//! TTL. Reads never fail: a missing, expired or unreadable file is simply
//! absent. Writes go to a temporary file in the same directory and are
//! published with a rename, so a failed write leaves the previous snapshot
//! intact.
//!
//! # Example
//!
//! ```no_run
//! use gallery_core::cache::CacheStore;
//! use gallery_core::hierarchy::RemoteNode;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = CacheStore::new("./photos/.gallery-downloader/cache");
//! let tree = RemoteNode::folder("root", "Account", Vec::new());
//! cache.store(&tree, 24).await?;
//! assert!(cache.load().await.is_some());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use crate::clock::unix_now;
use crate::filesystem::sanitize_filename;
use crate::hierarchy::{RemoteItem, RemoteNode};

/// Default snapshot lifetime.
pub const DEFAULT_CACHE_TTL_HOURS: u32 = 24;

/// Accepted TTL range in hours.
pub const CACHE_TTL_HOURS_RANGE: std::ops::RangeInclusive<u32> = 1..=168;

const HIERARCHY_FILE: &str = "hierarchy.json";
const ITEMS_DIR: &str = "items";
const SECONDS_PER_HOUR: i64 = 3600;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Errors from cache writes. Reads report absence instead of failing.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem failure while publishing or removing cache files.
    #[error("cache IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot could not be encoded.
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CacheError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A cached hierarchy snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Capture time, Unix seconds.
    pub captured_at: i64,
    pub ttl_hours: u32,
    pub tree: RemoteNode,
}

impl CacheEntry {
    /// Unix second at which the entry stops being fresh.
    #[must_use]
    pub fn expires_at(&self) -> i64 {
        expiry(self.captured_at, self.ttl_hours)
    }

    /// Fresh strictly before `captured_at + ttl`.
    #[must_use]
    pub fn is_fresh_at(&self, now: i64) -> bool {
        now < self.expires_at()
    }

    #[must_use]
    pub fn age_at(&self, now: i64) -> Duration {
        seconds_between(self.captured_at, now)
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(u64::from(self.ttl_hours) * 3600)
    }
}

/// Cached item listing for one gallery.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ItemsEntry {
    captured_at: i64,
    ttl_hours: u32,
    gallery_id: String,
    items: Vec<RemoteItem>,
}

/// Snapshot status for `cache-info` style reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheInfo {
    /// A readable snapshot exists (fresh or not).
    pub present: bool,
    pub age: Option<Duration>,
    pub ttl: Option<Duration>,
    pub expired: bool,
}

/// File-backed hierarchy cache. Single writer per directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn hierarchy_path(&self) -> PathBuf {
        self.dir.join(HIERARCHY_FILE)
    }

    fn items_path(&self, gallery_id: &str) -> PathBuf {
        self.dir
            .join(ITEMS_DIR)
            .join(format!("{}.json", sanitize_filename(gallery_id)))
    }

    /// Returns the snapshot if one exists and has not expired.
    pub async fn load(&self) -> Option<CacheEntry> {
        self.load_at(unix_now()).await
    }

    /// [`Self::load`] evaluated at an explicit time.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn load_at(&self, now: i64) -> Option<CacheEntry> {
        let entry: CacheEntry = read_json(&self.hierarchy_path()).await?;
        if entry.is_fresh_at(now) {
            debug!(captured_at = entry.captured_at, ttl_hours = entry.ttl_hours, "cache hit");
            Some(entry)
        } else {
            debug!(captured_at = entry.captured_at, ttl_hours = entry.ttl_hours, "cache expired");
            None
        }
    }

    /// Replaces the snapshot with `tree`, captured now.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the snapshot cannot be encoded or published.
    pub async fn store(&self, tree: &RemoteNode, ttl_hours: u32) -> Result<CacheEntry, CacheError> {
        self.store_at(tree, ttl_hours, unix_now()).await
    }

    /// [`Self::store`] with an explicit capture time.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the snapshot cannot be encoded or published.
    #[instrument(skip(self, tree), fields(dir = %self.dir.display()))]
    pub async fn store_at(
        &self,
        tree: &RemoteNode,
        ttl_hours: u32,
        captured_at: i64,
    ) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry {
            captured_at,
            ttl_hours,
            tree: tree.clone(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        write_atomic(&self.hierarchy_path(), &bytes).await?;
        debug!(bytes = bytes.len(), "hierarchy snapshot stored");
        Ok(entry)
    }

    /// Returns a gallery's cached items if present and fresh.
    pub async fn load_items(&self, gallery_id: &str) -> Option<Vec<RemoteItem>> {
        let entry: ItemsEntry = read_json(&self.items_path(gallery_id)).await?;
        if entry.gallery_id != gallery_id {
            return None;
        }
        (unix_now() < expiry(entry.captured_at, entry.ttl_hours)).then_some(entry.items)
    }

    /// Caches a gallery's item listing.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the listing cannot be encoded or published.
    pub async fn store_items(
        &self,
        gallery_id: &str,
        items: &[RemoteItem],
        ttl_hours: u32,
    ) -> Result<(), CacheError> {
        let entry = ItemsEntry {
            captured_at: unix_now(),
            ttl_hours,
            gallery_id: gallery_id.to_string(),
            items: items.to_vec(),
        };
        let bytes = serde_json::to_vec(&entry)?;
        write_atomic(&self.items_path(gallery_id), &bytes).await
    }

    /// Removes the snapshot and every cached item listing.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if an existing file cannot be removed.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn invalidate(&self) -> Result<(), CacheError> {
        let hierarchy = self.hierarchy_path();
        match tokio::fs::remove_file(&hierarchy).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(hierarchy, e)),
        }
        let items = self.dir.join(ITEMS_DIR);
        match tokio::fs::remove_dir_all(&items).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(CacheError::io(items, e)),
        }
        debug!("cache invalidated");
        Ok(())
    }

    /// Describes the snapshot without applying the TTL.
    pub async fn info(&self) -> CacheInfo {
        self.info_at(unix_now()).await
    }

    /// [`Self::info`] evaluated at an explicit time.
    pub async fn info_at(&self, now: i64) -> CacheInfo {
        match read_json::<CacheEntry>(&self.hierarchy_path()).await {
            Some(entry) => CacheInfo {
                present: true,
                age: Some(entry.age_at(now)),
                ttl: Some(entry.ttl()),
                expired: !entry.is_fresh_at(now),
            },
            None => CacheInfo {
                present: false,
                age: None,
                ttl: None,
                expired: false,
            },
        }
    }
}

fn expiry(captured_at: i64, ttl_hours: u32) -> i64 {
    captured_at.saturating_add(i64::from(ttl_hours).saturating_mul(SECONDS_PER_HOUR))
}

fn seconds_between(from: i64, to: i64) -> Duration {
    Duration::from_secs(u64::try_from(to.saturating_sub(from)).unwrap_or(0))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "unreadable cache file, treating as absent");
            return None;
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt cache file, treating as absent");
            None
        }
    }
}

/// Writes `bytes` to a sibling temp file, syncs it, then renames over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let parent = path
        .parent()
        .ok_or_else(|| CacheError::io(path, std::io::Error::other("no parent directory")))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| CacheError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map_or_else(|| "cache".into(), |name| name.to_string_lossy().into_owned());
    let tmp_path = parent.join(format!(
        ".{file_name}.tmp.{}.{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::SeqCst)
    ));

    let result = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(CacheError::io(path, e));
    }
    if let Err(e) = sync_dir(parent).await {
        warn!(path = %parent.display(), error = %e, "failed to sync cache directory");
    }
    Ok(())
}

/// Flushes directory entries so a completed rename survives a crash.
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> std::io::Result<()> {
    tokio::fs::File::open(dir).await?.sync_all().await
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}
