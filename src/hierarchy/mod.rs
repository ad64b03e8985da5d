//! Remote hierarchy model and the enumeration seam.
//!
//! - [`RemoteNode`] / [`RemoteItem`] - typed folders, galleries and items
//! - [`RemoteSource`] - contract the engine consumes for enumeration
//! - [`ManifestSource`] - source reading an exported JSON manifest
//! - [`GalleryFilter`] - name pattern, node id and depth selection

mod filter;
mod manifest;
mod model;
mod source;

pub use filter::GalleryFilter;
pub use manifest::{Manifest, ManifestLocation, ManifestSource};
pub use model::{MAX_TREE_DEPTH, NodeKind, RemoteItem, RemoteNode, ResolvedUrl};
pub use source::{RemoteSource, SourceError};
