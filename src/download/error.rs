//! Error types for item transfers.
//!
//! Every variant maps onto an [`ErrorKind`] so the retry policy and the
//! orchestrator can decide what to do without matching on transport details.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::retry::parse_retry_after;
use crate::failure::ErrorKind;
use crate::hierarchy::SourceError;

/// Errors that can occur while transferring one item.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, reset, TLS).
    #[error("network error downloading {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout { url: String },

    /// Non-success HTTP response.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        url: String,
        status: u16,
        /// Raw Retry-After header, if the response carried one.
        retry_after: Option<String>,
    },

    /// File system error while writing the destination.
    #[error("IO error writing to {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The download URL could not be parsed.
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// The remote could not produce a download URL for the item.
    #[error("could not resolve download URL for {item_id}: {source}")]
    Resolve {
        item_id: String,
        #[source]
        source: SourceError,
    },

    /// Written bytes do not match the expected size or signature.
    #[error("integrity check failed for {path}: {details}")]
    Integrity { path: PathBuf, details: String },

    /// The destination cannot hold a file.
    #[error("invalid destination {path}: {reason}")]
    InvalidDestination { path: PathBuf, reason: String },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after: None,
        }
    }

    /// Creates an HTTP status error with a Retry-After header value.
    pub fn http_status_with_retry_after(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Wraps a URL resolution failure from the remote source.
    pub fn resolve(item_id: impl Into<String>, source: SourceError) -> Self {
        Self::Resolve {
            item_id: item_id.into(),
            source,
        }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(path: impl Into<PathBuf>, details: impl Into<String>) -> Self {
        Self::Integrity {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Creates an invalid destination error.
    pub fn invalid_destination(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidDestination {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Classifies this error in the shared taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => ErrorKind::TransientNetwork,
            // The account was already accepted during enumeration; a file host
            // refusing one item's URL only fails that item.
            Self::HttpStatus { status, .. } => match ErrorKind::from_http_status(*status) {
                ErrorKind::AuthenticationFailed => ErrorKind::Forbidden,
                kind => kind,
            },
            Self::Io { source, .. } => ErrorKind::from_io(source),
            Self::InvalidUrl { .. } => ErrorKind::ClientError,
            Self::Resolve { source, .. } => source.kind(),
            Self::Integrity { .. } => ErrorKind::IntegrityMismatch,
            Self::InvalidDestination { .. } => ErrorKind::InvalidDestination,
        }
    }

    /// Delay the remote asked for before the next attempt, if any.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::HttpStatus {
                retry_after: Some(raw),
                ..
            } => parse_retry_after(raw),
            Self::Resolve {
                source: SourceError::RateLimited { retry_after },
                ..
            } => *retry_after,
            _ => None,
        }
    }
}

// No From impls for reqwest::Error or std::io::Error: every variant needs
// the url or path, which only the caller has.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://example.com/a.jpg");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/a.jpg"));
        assert_eq!(error.kind(), ErrorKind::TransientNetwork);
    }

    #[test]
    fn test_download_error_http_status_kinds() {
        assert_eq!(
            DownloadError::http_status("u", 404).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            DownloadError::http_status("u", 503).kind(),
            ErrorKind::ServerError
        );
        assert_eq!(
            DownloadError::http_status("u", 429).kind(),
            ErrorKind::RateLimited
        );
        assert_eq!(
            DownloadError::http_status("u", 403).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(
            DownloadError::http_status("u", 401).kind(),
            ErrorKind::Forbidden
        );
    }

    #[test]
    fn test_download_error_io_kind_follows_io_error() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error = DownloadError::io(PathBuf::from("/tmp/a.jpg"), denied);
        assert!(error.to_string().contains("/tmp/a.jpg"));
        assert_eq!(error.kind(), ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_download_error_resolve_uses_source_kind() {
        let error = DownloadError::resolve("p1", SourceError::not_found("item", "p1"));
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(error.to_string().contains("p1"));
    }

    #[test]
    fn test_download_error_rejected_credentials_at_resolve_stay_run_fatal() {
        let error = DownloadError::resolve("p1", SourceError::from_status(401, "item", "p1"));
        assert_eq!(error.kind(), ErrorKind::AuthenticationFailed);
        assert_eq!(error.kind().scope(), crate::failure::ErrorScope::Run);

        let error = DownloadError::http_status("u", 403);
        assert_eq!(error.kind().scope(), crate::failure::ErrorScope::Item);
    }

    #[test]
    fn test_download_error_retry_after_hint() {
        let error = DownloadError::http_status_with_retry_after("u", 429, Some("7".to_string()));
        assert_eq!(error.retry_after(), Some(Duration::from_secs(7)));

        let error = DownloadError::resolve(
            "p1",
            SourceError::RateLimited {
                retry_after: Some(Duration::from_secs(3)),
            },
        );
        assert_eq!(error.retry_after(), Some(Duration::from_secs(3)));

        assert_eq!(DownloadError::http_status("u", 429).retry_after(), None);
    }

    #[test]
    fn test_download_error_integrity_is_retryable() {
        let error = DownloadError::integrity("/tmp/a.jpg", "expected 3 bytes, got 2");
        assert!(error.kind().is_retryable());
    }
}
