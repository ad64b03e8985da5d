//! Error types for checkpoint operations.

use std::fmt;

use thiserror::Error;

use crate::db::DbError;

/// Structured classification for checkpoint database failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointDbErrorKind {
    /// `SQLite` returned busy/locked under concurrent access.
    BusyOrLocked,
    /// Constraint failure (unique/check/not-null).
    ConstraintViolation,
    /// Connection pool timed out waiting for a free connection.
    PoolTimeout,
    /// Connection pool is closed.
    PoolClosed,
    /// Filesystem or transport IO failure.
    Io,
    /// Unclassified database failure.
    Other,
}

impl CheckpointDbErrorKind {
    #[must_use]
    pub fn from_sqlx(error: &sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut => Self::PoolTimeout,
            sqlx::Error::PoolClosed => Self::PoolClosed,
            sqlx::Error::Io(_) => Self::Io,
            sqlx::Error::Database(database_error) => {
                classify_database_error(database_error.as_ref())
            }
            _ => Self::Other,
        }
    }
}

impl fmt::Display for CheckpointDbErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::BusyOrLocked => "busy_or_locked",
            Self::ConstraintViolation => "constraint_violation",
            Self::PoolTimeout => "pool_timeout",
            Self::PoolClosed => "pool_closed",
            Self::Io => "io",
            Self::Other => "other",
        };
        write!(f, "{label}")
    }
}

fn classify_database_error(
    database_error: &(dyn sqlx::error::DatabaseError + 'static),
) -> CheckpointDbErrorKind {
    let code = database_error.code();
    if matches!(
        code.as_deref(),
        Some("SQLITE_BUSY" | "SQLITE_LOCKED" | "5" | "6")
    ) {
        return CheckpointDbErrorKind::BusyOrLocked;
    }

    if database_error.is_unique_violation()
        || database_error.is_check_violation()
        || code
            .as_deref()
            .is_some_and(|value| value.starts_with("SQLITE_CONSTRAINT"))
    {
        return CheckpointDbErrorKind::ConstraintViolation;
    }

    let message = database_error.message().to_ascii_lowercase();
    if message.contains("database is locked") || message.contains("database is busy") {
        return CheckpointDbErrorKind::BusyOrLocked;
    }

    CheckpointDbErrorKind::Other
}

/// Errors that can occur during checkpoint operations.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The checkpoint database could not be opened or migrated.
    #[error("cannot open checkpoint store: {0}")]
    Open(#[from] DbError),

    /// A query failed.
    #[error("checkpoint database error ({kind}): {message}")]
    Database {
        kind: CheckpointDbErrorKind,
        message: String,
    },

    /// A stored row does not decode.
    #[error("invalid checkpoint record for {item_id}: {reason}")]
    InvalidRecord { item_id: String, reason: String },
}

impl From<sqlx::Error> for CheckpointError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: CheckpointDbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl CheckpointError {
    /// Error for writes attempted after the store was closed.
    #[must_use]
    pub fn closed() -> Self {
        Self::Database {
            kind: CheckpointDbErrorKind::PoolClosed,
            message: "checkpoint store is closed".to_string(),
        }
    }

    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<CheckpointDbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            Self::Open(_) | Self::InvalidRecord { .. } => None,
        }
    }

    #[must_use]
    pub fn is_busy_or_locked(&self) -> bool {
        self.database_kind() == Some(CheckpointDbErrorKind::BusyOrLocked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_error_database_message() {
        let err = CheckpointError::Database {
            kind: CheckpointDbErrorKind::Other,
            message: "disk I/O error".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("checkpoint database error"));
        assert!(msg.contains("other"));
        assert!(msg.contains("disk I/O error"));
    }

    #[test]
    fn test_checkpoint_error_busy_flag() {
        let err = CheckpointError::Database {
            kind: CheckpointDbErrorKind::BusyOrLocked,
            message: "database is locked".to_string(),
        };
        assert!(err.is_busy_or_locked());
        assert!(!CheckpointError::closed().is_busy_or_locked());
    }

    #[test]
    fn test_pool_closed_maps_from_sqlx() {
        let err = CheckpointError::from(sqlx::Error::PoolClosed);
        assert_eq!(err.database_kind(), Some(CheckpointDbErrorKind::PoolClosed));
    }
}
