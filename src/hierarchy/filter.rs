//! Gallery selection: name pattern, explicit node id and depth limit.

use regex::{Regex, RegexBuilder};
use tracing::warn;

use super::{RemoteNode, SourceError};

/// Restricts which galleries of a hierarchy are downloaded.
#[derive(Debug, Clone, Default)]
pub struct GalleryFilter {
    title_pattern: Option<Regex>,
    node_id: Option<String>,
    max_depth: Option<usize>,
}

impl GalleryFilter {
    /// Builds a filter. An invalid title pattern is logged and ignored.
    #[must_use]
    pub fn new(title_pattern: Option<&str>, node_id: Option<String>, max_depth: Option<usize>) -> Self {
        let title_pattern = title_pattern.and_then(|raw| {
            match RegexBuilder::new(raw).case_insensitive(true).build() {
                Ok(regex) => Some(regex),
                Err(e) => {
                    warn!(pattern = raw, error = %e, "ignoring invalid gallery filter pattern");
                    None
                }
            }
        });
        Self {
            title_pattern,
            node_id,
            max_depth,
        }
    }

    /// Returns true when no criterion is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.title_pattern.is_none() && self.node_id.is_none() && self.max_depth.is_none()
    }

    /// Selects item-holding nodes in hierarchy order.
    ///
    /// With a node id the walk starts at that node, and depth counts from it
    /// (the selected node is depth 0).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotFound`] when the explicit node id is not in the tree.
    pub fn select<'a>(&self, root: &'a RemoteNode) -> Result<Vec<&'a RemoteNode>, SourceError> {
        let start = match &self.node_id {
            Some(id) => root
                .find(id)
                .ok_or_else(|| SourceError::not_found("node", id.clone()))?,
            None => root,
        };

        let mut selected = Vec::new();
        start.walk(&mut |node, depth| {
            if !node.kind.holds_items() {
                return;
            }
            if self.max_depth.is_some_and(|max| depth > max) {
                return;
            }
            if let Some(pattern) = &self.title_pattern
                && !pattern.is_match(&node.title)
            {
                return;
            }
            selected.push(node);
        });
        Ok(selected)
    }
}
