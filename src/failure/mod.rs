//! Error taxonomy shared by enumeration, transfer and checkpointing.
//!
//! Every failure that can reach an item is reduced to an [`ErrorKind`]. The
//! kind decides two things: whether the Retry Policy may try again, and
//! whether the failure stays with the item or ends the whole run.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Classified failure of a remote call or an item transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Connection reset, refused, DNS failure or timeout.
    TransientNetwork,
    /// HTTP 429 or a remote throttling code.
    RateLimited,
    /// HTTP 5xx.
    ServerError,
    /// Credentials rejected by the remote.
    AuthenticationFailed,
    /// HTTP 403 on a single resource, or credentials rejected for one item's file.
    Forbidden,
    /// The item or gallery no longer exists remotely.
    NotFound,
    /// Written bytes do not match the expected size or signature.
    IntegrityMismatch,
    /// No space left on the destination device.
    DiskFull,
    /// The destination cannot be written.
    PermissionDenied,
    /// The destination path cannot be constructed or used.
    InvalidDestination,
    /// Other 4xx responses.
    ClientError,
    /// Remaining local IO failures.
    Io,
}

/// Reach of a failure: a single item, or the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// The item is marked failed and the run continues.
    Item,
    /// No other item can succeed either; the run stops.
    Run,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [Self; 12] = [
        Self::TransientNetwork,
        Self::RateLimited,
        Self::ServerError,
        Self::AuthenticationFailed,
        Self::Forbidden,
        Self::NotFound,
        Self::IntegrityMismatch,
        Self::DiskFull,
        Self::PermissionDenied,
        Self::InvalidDestination,
        Self::ClientError,
        Self::Io,
    ];

    /// Returns the stable string stored in the checkpoint database.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient_network",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::AuthenticationFailed => "authentication_failed",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not_found",
            Self::IntegrityMismatch => "integrity_mismatch",
            Self::DiskFull => "disk_full",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidDestination => "invalid_destination",
            Self::ClientError => "client_error",
            Self::Io => "io",
        }
    }

    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::TransientNetwork | Self::RateLimited | Self::ServerError | Self::IntegrityMismatch
        )
    }

    #[must_use]
    pub fn scope(self) -> ErrorScope {
        match self {
            Self::AuthenticationFailed | Self::DiskFull | Self::PermissionDenied => ErrorScope::Run,
            _ => ErrorScope::Item,
        }
    }

    /// Short user-facing label for the final report.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::TransientNetwork => "Network failure",
            Self::RateLimited => "Rate limited",
            Self::ServerError => "Server error",
            Self::AuthenticationFailed => "Authentication failed",
            Self::Forbidden => "Access forbidden",
            Self::NotFound => "Not found",
            Self::IntegrityMismatch => "Integrity mismatch",
            Self::DiskFull => "Disk full",
            Self::PermissionDenied => "Permission denied",
            Self::InvalidDestination => "Invalid destination",
            Self::ClientError => "Rejected request",
            Self::Io => "Local IO failure",
        }
    }

    /// Suggested next step for the user.
    #[must_use]
    pub fn fix(self) -> &'static str {
        match self {
            Self::TransientNetwork | Self::ServerError | Self::RateLimited => {
                "Rerun later to resume; completed items are skipped."
            }
            Self::AuthenticationFailed => "Check the account credentials, then rerun.",
            Self::Forbidden => "Check the item's sharing settings, then rerun with --retry-failed.",
            Self::NotFound => "The item was removed remotely; refresh the cache with --refresh.",
            Self::IntegrityMismatch => "Rerun with --retry-failed to fetch the item again.",
            Self::DiskFull => "Free disk space on the output device, then rerun.",
            Self::PermissionDenied => "Check write permissions on the output directory.",
            Self::InvalidDestination => "Choose a different output directory.",
            Self::ClientError => "Inspect logs for the rejected request.",
            Self::Io => "Inspect logs for the failing path and rerun.",
        }
    }

    /// Classifies an HTTP status code.
    #[must_use]
    #[allow(clippy::match_same_arms)]
    pub fn from_http_status(status: u16) -> Self {
        match status {
            401 | 407 => Self::AuthenticationFailed,
            403 => Self::Forbidden,
            404 | 410 => Self::NotFound,
            408 => Self::TransientNetwork,
            429 => Self::RateLimited,
            500..=599 => Self::ServerError,
            _ => Self::ClientError,
        }
    }

    /// Classifies a local IO error.
    #[must_use]
    pub fn from_io(error: &std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::StorageFull => Self::DiskFull,
            std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::ReadOnlyFilesystem => {
                Self::PermissionDenied
            }
            std::io::ErrorKind::NotADirectory | std::io::ErrorKind::IsADirectory => {
                Self::InvalidDestination
            }
            _ => Self::Io,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("invalid error kind: {s}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds_match_taxonomy() {
        let retryable: Vec<ErrorKind> = ErrorKind::ALL
            .into_iter()
            .filter(|kind| kind.is_retryable())
            .collect();
        assert_eq!(
            retryable,
            vec![
                ErrorKind::TransientNetwork,
                ErrorKind::RateLimited,
                ErrorKind::ServerError,
                ErrorKind::IntegrityMismatch,
            ]
        );
    }

    #[test]
    fn test_run_fatal_kinds() {
        assert_eq!(ErrorKind::AuthenticationFailed.scope(), ErrorScope::Run);
        assert_eq!(ErrorKind::DiskFull.scope(), ErrorScope::Run);
        assert_eq!(ErrorKind::PermissionDenied.scope(), ErrorScope::Run);
        assert_eq!(ErrorKind::NotFound.scope(), ErrorScope::Item);
        assert_eq!(ErrorKind::Forbidden.scope(), ErrorScope::Item);
        assert!(!ErrorKind::Forbidden.is_retryable());
        assert_eq!(ErrorKind::IntegrityMismatch.scope(), ErrorScope::Item);
    }

    #[test]
    fn test_http_status_classification() {
        assert_eq!(ErrorKind::from_http_status(401), ErrorKind::AuthenticationFailed);
        assert_eq!(ErrorKind::from_http_status(407), ErrorKind::AuthenticationFailed);
        assert_eq!(ErrorKind::from_http_status(403), ErrorKind::Forbidden);
        assert_eq!(ErrorKind::from_http_status(404), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_http_status(410), ErrorKind::NotFound);
        assert_eq!(ErrorKind::from_http_status(408), ErrorKind::TransientNetwork);
        assert_eq!(ErrorKind::from_http_status(429), ErrorKind::RateLimited);
        assert_eq!(ErrorKind::from_http_status(503), ErrorKind::ServerError);
        assert_eq!(ErrorKind::from_http_status(400), ErrorKind::ClientError);
    }

    #[test]
    fn test_io_classification() {
        let full = std::io::Error::new(std::io::ErrorKind::StorageFull, "no space");
        assert_eq!(ErrorKind::from_io(&full), ErrorKind::DiskFull);
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(ErrorKind::from_io(&denied), ErrorKind::PermissionDenied);
        let other = std::io::Error::other("boom");
        assert_eq!(ErrorKind::from_io(&other), ErrorKind::Io);
    }

    #[test]
    fn test_string_form_parses_back() {
        for kind in ErrorKind::ALL {
            assert_eq!(kind.as_str().parse::<ErrorKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<ErrorKind>().is_err());
    }
}
