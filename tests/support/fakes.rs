//! In-memory remote source and transfer primitive for orchestrator tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gallery_core::hierarchy::ResolvedUrl;
use gallery_core::{DownloadError, RemoteItem, RemoteNode, RemoteSource, SourceError, Transfer};

const URL_SCHEME: &str = "mem://";

/// Bytes served for an item id.
pub fn content_for(item_id: &str) -> Vec<u8> {
    format!("image-bytes-of-{item_id}").into_bytes()
}

/// An account with `galleries` galleries of `per_gallery` items each,
/// all under one "Albums" folder. Item ids are `p1..pN` in order.
pub fn account(galleries: usize, per_gallery: usize) -> (RemoteNode, HashMap<String, Vec<RemoteItem>>) {
    let mut nodes = Vec::new();
    let mut items = HashMap::new();
    let mut next = 1;
    for g in 1..=galleries {
        let gallery_id = format!("g{g}");
        let listing: Vec<RemoteItem> = (0..per_gallery)
            .map(|_| {
                let id = format!("p{next}");
                next += 1;
                let mut item = RemoteItem::new(&id, &gallery_id, format!("{id}.jpg"));
                item.size = Some(content_for(&id).len() as u64);
                item.taken_at = Some(1_600_000_000);
                item
            })
            .collect();
        nodes.push(RemoteNode::gallery(
            &gallery_id,
            format!("Gallery {g}"),
            per_gallery as u64,
        ));
        items.insert(gallery_id, listing);
    }
    let root = RemoteNode::folder("root", "Account", vec![RemoteNode::folder("f1", "Albums", nodes)]);
    (root, items)
}

/// Scriptable [`RemoteSource`] that counts its calls.
#[derive(Default)]
pub struct FakeSource {
    tree: Option<RemoteNode>,
    items: HashMap<String, Vec<RemoteItem>>,
    hierarchy_error: Option<SourceError>,
    listing_errors: HashMap<String, SourceError>,
    missing_items: HashSet<String>,
    pub hierarchy_calls: AtomicUsize,
    pub listing_calls: AtomicUsize,
    pub resolve_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(tree: RemoteNode, items: HashMap<String, Vec<RemoteItem>>) -> Self {
        Self {
            tree: Some(tree),
            items,
            ..Self::default()
        }
    }

    pub fn unreachable(error: SourceError) -> Self {
        Self {
            hierarchy_error: Some(error),
            ..Self::default()
        }
    }

    /// Resolving these items fails with `NotFound`.
    #[must_use]
    pub fn with_missing(mut self, ids: &[&str]) -> Self {
        self.missing_items = ids.iter().map(|id| (*id).to_string()).collect();
        self
    }

    /// Listing `gallery_id` fails with `error`.
    #[must_use]
    pub fn with_listing_error(mut self, gallery_id: &str, error: SourceError) -> Self {
        self.listing_errors.insert(gallery_id.to_string(), error);
        self
    }

    pub fn hierarchy_calls(&self) -> usize {
        self.hierarchy_calls.load(Ordering::SeqCst)
    }

    pub fn listing_calls(&self) -> usize {
        self.listing_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    async fn fetch_hierarchy(&self) -> Result<RemoteNode, SourceError> {
        self.hierarchy_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.hierarchy_error {
            return Err(error.clone());
        }
        self.tree
            .clone()
            .ok_or_else(|| SourceError::malformed("no tree scripted"))
    }

    async fn fetch_gallery_items(&self, gallery_id: &str) -> Result<Vec<RemoteItem>, SourceError> {
        self.listing_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.listing_errors.get(gallery_id) {
            return Err(error.clone());
        }
        self.items
            .get(gallery_id)
            .cloned()
            .ok_or_else(|| SourceError::not_found("gallery", gallery_id))
    }

    async fn resolve_download_url(&self, item_id: &str) -> Result<ResolvedUrl, SourceError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.missing_items.contains(item_id) {
            return Err(SourceError::not_found("item", item_id));
        }
        Ok(ResolvedUrl {
            url: format!("{URL_SCHEME}{item_id}"),
            expires_at: None,
        })
    }
}

/// What a scripted transfer attempt should do.
#[derive(Debug, Clone)]
pub enum Scripted {
    Timeout,
    DiskFull,
    Forbidden,
}

/// [`Transfer`] writing [`content_for`] the item id encoded in the URL.
///
/// Tracks how many transfers ran and the peak number running at once.
pub struct FakeTransfer {
    delay: Duration,
    script: Mutex<HashMap<String, Vec<Scripted>>>,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    pub calls: AtomicUsize,
    pub written: Mutex<Vec<String>>,
}

impl Default for FakeTransfer {
    fn default() -> Self {
        Self::new(Duration::from_millis(5))
    }
}

impl FakeTransfer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            script: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            written: Mutex::new(Vec::new()),
        }
    }

    /// Consumes one scripted result per attempt for `item_id` before succeeding.
    #[must_use]
    pub fn with_script(self, item_id: &str, attempts: Vec<Scripted>) -> Self {
        self.script
            .lock()
            .unwrap()
            .insert(item_id.to_string(), attempts);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn written_ids(&self) -> Vec<String> {
        let mut ids = self.written.lock().unwrap().clone();
        ids.sort();
        ids
    }

    fn next_scripted(&self, item_id: &str) -> Option<Scripted> {
        let mut script = self.script.lock().unwrap();
        let attempts = script.get_mut(item_id)?;
        if attempts.is_empty() {
            None
        } else {
            Some(attempts.remove(0))
        }
    }
}

#[async_trait]
impl Transfer for FakeTransfer {
    async fn transfer(
        &self,
        url: &str,
        destination: &Path,
        _timeout: Duration,
    ) -> Result<u64, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;

        let result = async {
            let item_id = url
                .strip_prefix(URL_SCHEME)
                .ok_or_else(|| DownloadError::invalid_url(url))?;
            match self.next_scripted(item_id) {
                Some(Scripted::Timeout) => return Err(DownloadError::timeout(url)),
                Some(Scripted::Forbidden) => return Err(DownloadError::http_status(url, 403)),
                Some(Scripted::DiskFull) => {
                    return Err(DownloadError::io(
                        destination,
                        std::io::Error::from(std::io::ErrorKind::StorageFull),
                    ));
                }
                None => {}
            }
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DownloadError::io(parent, e))?;
            }
            let bytes = content_for(item_id);
            tokio::fs::write(destination, &bytes)
                .await
                .map_err(|e| DownloadError::io(destination, e))?;
            self.written.lock().unwrap().push(item_id.to_string());
            Ok(bytes.len() as u64)
        }
        .await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
