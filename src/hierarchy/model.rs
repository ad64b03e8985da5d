//! Typed remote entities: folders, galleries and downloadable items.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::SourceError;

/// Deepest nesting accepted below the root. Tree walks recurse per level.
pub const MAX_TREE_DEPTH: usize = 32;

/// Kind of a node in the remote hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Groups other nodes; never holds items directly.
    Folder,
    /// Holds items.
    Gallery,
    /// Holds items that also appear elsewhere; downloaded like a gallery.
    Collection,
}

impl NodeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Folder => "folder",
            Self::Gallery => "gallery",
            Self::Collection => "collection",
        }
    }

    /// Whether nodes of this kind own downloadable items.
    #[must_use]
    pub fn holds_items(self) -> bool {
        !matches!(self, Self::Folder)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A folder or gallery in the remote hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Stable identifier, unique within one snapshot.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Titles of all ancestors, root first.
    #[serde(default)]
    pub path: Vec<String>,
    pub kind: NodeKind,
    /// Child nodes in remote order (folders only).
    #[serde(default)]
    pub children: Vec<RemoteNode>,
    /// Number of items the remote reports for this node.
    #[serde(default)]
    pub item_count: u64,
    /// Last modification, Unix seconds.
    #[serde(default)]
    pub modified_at: Option<i64>,
}

impl RemoteNode {
    /// Creates a folder node with the given children.
    #[must_use]
    pub fn folder(id: impl Into<String>, title: impl Into<String>, children: Vec<Self>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            path: Vec::new(),
            kind: NodeKind::Folder,
            children,
            item_count: 0,
            modified_at: None,
        }
    }

    /// Creates a gallery node.
    #[must_use]
    pub fn gallery(id: impl Into<String>, title: impl Into<String>, item_count: u64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            path: Vec::new(),
            kind: NodeKind::Gallery,
            children: Vec::new(),
            item_count,
            modified_at: None,
        }
    }

    /// Checks the tree shape and recomputes every node's path from its ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Malformed`] if an identifier repeats, an
    /// item-holding node has children or nesting exceeds [`MAX_TREE_DEPTH`].
    pub fn validated(mut self) -> Result<Self, SourceError> {
        let mut seen = HashSet::new();
        self.assign_paths(&[], &mut seen)?;
        Ok(self)
    }

    fn assign_paths(
        &mut self,
        ancestors: &[String],
        seen: &mut HashSet<String>,
    ) -> Result<(), SourceError> {
        if ancestors.len() > MAX_TREE_DEPTH {
            return Err(SourceError::malformed(format!(
                "node {} is nested deeper than {MAX_TREE_DEPTH} levels",
                self.id
            )));
        }
        if !seen.insert(self.id.clone()) {
            return Err(SourceError::malformed(format!(
                "duplicate node id {}",
                self.id
            )));
        }
        if self.kind.holds_items() && !self.children.is_empty() {
            return Err(SourceError::malformed(format!(
                "{} {} has child nodes",
                self.kind, self.id
            )));
        }

        self.path = ancestors.to_vec();
        let mut lineage = ancestors.to_vec();
        lineage.push(self.title.clone());
        for child in &mut self.children {
            child.assign_paths(&lineage, seen)?;
        }
        Ok(())
    }

    /// Finds a node by identifier, depth first.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Self> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(id))
    }

    /// Calls `visit` for this node and every descendant with its depth (root = 0).
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Self, usize)) {
        self.walk_at(0, visit);
    }

    fn walk_at<'a>(&'a self, depth: usize, visit: &mut impl FnMut(&'a Self, usize)) {
        visit(self, depth);
        for child in &self.children {
            child.walk_at(depth + 1, visit);
        }
    }

    /// Number of item-holding nodes in this subtree.
    #[must_use]
    pub fn gallery_count(&self) -> usize {
        let mut count = 0;
        self.walk(&mut |node, _| {
            if node.kind.holds_items() {
                count += 1;
            }
        });
        count
    }

    /// Sum of reported item counts in this subtree.
    #[must_use]
    pub fn total_item_count(&self) -> u64 {
        let mut total = 0;
        self.walk(&mut |node, _| total += node.item_count);
        total
    }
}

/// A downloadable photo or video inside a gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: String,
    /// Identifier of the owning gallery.
    pub gallery_id: String,
    pub file_name: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Expected byte size, when the remote reports it.
    #[serde(default)]
    pub size: Option<u64>,
    /// Expected SHA-256 of the content, lowercase hex.
    #[serde(default)]
    pub signature: Option<String>,
    /// Original capture time, Unix seconds.
    #[serde(default)]
    pub taken_at: Option<i64>,
    /// Download URL as listed; may be time-limited.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub url_expires_at: Option<i64>,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub mime_type: Option<String>,
}

impl RemoteItem {
    /// Creates an item with only the required fields set.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        gallery_id: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            gallery_id: gallery_id.into(),
            file_name: file_name.into(),
            title: None,
            size: None,
            signature: None,
            taken_at: None,
            url: None,
            url_expires_at: None,
            is_video: false,
            mime_type: None,
        }
    }
}

/// A download URL together with its expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrl {
    pub url: String,
    /// Unix seconds after which the URL must be resolved again.
    pub expires_at: Option<i64>,
}

impl ResolvedUrl {
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }
}
