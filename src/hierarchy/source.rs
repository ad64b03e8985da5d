//! Remote enumeration seam.
//!
//! The remote protocol (authentication, request mapping, pagination) lives
//! behind [`RemoteSource`]. The engine only sees typed nodes and items and a
//! classified [`SourceError`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::{RemoteItem, RemoteNode, ResolvedUrl};
use crate::failure::ErrorKind;

/// Errors reported by a remote source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Credentials were rejected.
    #[error("authentication rejected by remote: {message}")]
    Auth {
        /// Remote or transport message.
        message: String,
    },

    /// Access to one entity was refused.
    #[error("access to {what} {id} forbidden")]
    Forbidden {
        /// Entity kind (`gallery`, `item`, ...).
        what: &'static str,
        /// Requested identifier.
        id: String,
    },

    /// The remote could not be reached.
    #[error("network error contacting remote: {message}")]
    Network {
        /// Transport error text.
        message: String,
    },

    /// The remote answered with a 5xx status.
    #[error("remote server error (HTTP {status})")]
    Server {
        /// HTTP status code.
        status: u16,
    },

    /// The remote asked us to slow down.
    #[error("rate limited by remote")]
    RateLimited {
        /// Delay requested by the remote, if any.
        retry_after: Option<Duration>,
    },

    /// The requested entity does not exist.
    #[error("{what} not found: {id}")]
    NotFound {
        /// Entity kind (`gallery`, `item`, ...).
        what: &'static str,
        /// Requested identifier.
        id: String,
    },

    /// The remote returned data that does not fit the typed model.
    #[error("malformed remote data: {message}")]
    Malformed {
        /// What was wrong with the data.
        message: String,
    },
}

impl SourceError {
    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Creates a malformed-data error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }

    /// Maps an HTTP status returned by the remote API.
    pub fn from_status(status: u16, what: &'static str, id: impl Into<String>) -> Self {
        match ErrorKind::from_http_status(status) {
            ErrorKind::AuthenticationFailed => Self::auth(format!("HTTP {status}")),
            ErrorKind::Forbidden => Self::Forbidden { what, id: id.into() },
            ErrorKind::NotFound => Self::not_found(what, id),
            ErrorKind::RateLimited => Self::RateLimited { retry_after: None },
            ErrorKind::ServerError => Self::Server { status },
            ErrorKind::TransientNetwork => Self::network(format!("HTTP {status}")),
            _ => Self::malformed(format!("unexpected HTTP {status} for {what}")),
        }
    }

    /// Classifies this error in the shared taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::AuthenticationFailed,
            Self::Forbidden { .. } => ErrorKind::Forbidden,
            Self::Network { .. } => ErrorKind::TransientNetwork,
            Self::Server { .. } => ErrorKind::ServerError,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Malformed { .. } => ErrorKind::ClientError,
        }
    }
}

/// Data-access contract for the remote content host.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Enumerates the full folder/gallery tree, root first.
    async fn fetch_hierarchy(&self) -> Result<RemoteNode, SourceError>;

    /// Lists the items of one gallery.
    async fn fetch_gallery_items(&self, gallery_id: &str) -> Result<Vec<RemoteItem>, SourceError>;

    /// Produces a fresh download URL for an item.
    async fn resolve_download_url(&self, item_id: &str) -> Result<ResolvedUrl, SourceError>;
}
