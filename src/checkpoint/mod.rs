//! Checkpoint Store: durable per-item outcomes for resumable runs.
//!
//! One row per item identifier holds the outcome of the item's final attempt.
//! [`CheckpointStore::record`] returns only after the row is committed, and the
//! database runs WAL with `synchronous=FULL`, so an item reported done is never
//! redone after a crash and an item whose record did not return always is.
//!
//! # Example
//!
//! ```no_run
//! use gallery_core::checkpoint::CheckpointStore;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CheckpointStore::open(Path::new("out/.gallery-downloader/checkpoint.db")).await?;
//! let done = store.load_skip_set().await?;
//! println!("{} items already downloaded", done.len());
//! # Ok(())
//! # }
//! ```

mod error;
mod record;

pub use error::{CheckpointDbErrorKind, CheckpointError};
pub use record::{CheckpointCounts, CheckpointRecord};

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::clock::unix_now;
use crate::db::Database;
use crate::download::{OutcomeKind, TaskOutcome};

/// Result type for checkpoint operations.
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// SQLite-backed record of item outcomes.
///
/// Clones share the connection pool and the write lock.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    db: Database,
    write_lock: Arc<Mutex<()>>,
}

impl CheckpointStore {
    /// Opens (creating if needed) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Open`] if the database cannot be opened.
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Database::new(path).await?))
    }

    /// Opens a throwaway in-memory store.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Open`] if the database cannot be created.
    pub async fn in_memory() -> Result<Self> {
        Ok(Self::new(Database::new_in_memory().await?))
    }

    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Identifiers whose last outcome is `completed`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn load_skip_set(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT item_id FROM checkpoint WHERE outcome = ?")
            .bind(OutcomeKind::Completed.as_str())
            .fetch_all(self.db.pool())
            .await?;
        let skip_set = rows
            .iter()
            .map(|row| row.try_get::<String, _>("item_id"))
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        debug!(items = skip_set.len(), "loaded skip set");
        Ok(skip_set)
    }

    /// Upserts the outcome for `item_id`. Durable once this returns.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Database`] if the write fails.
    #[instrument(skip(self, outcome), fields(outcome = %outcome.outcome_kind()))]
    pub async fn record(&self, item_id: &str, gallery_id: &str, outcome: &TaskOutcome) -> Result<()> {
        let (error_kind, attempts, bytes_written) = match outcome {
            TaskOutcome::Completed { bytes_written, .. } => (None, 0, *bytes_written),
            TaskOutcome::Skipped { .. } => (None, 0, 0),
            TaskOutcome::Failed { kind, attempts } => (Some(kind.as_str()), *attempts, 0),
        };

        let _guard = self.write_lock.lock().await;
        sqlx::query(
            r"INSERT INTO checkpoint (
                item_id, gallery_id, outcome, error_kind, attempts, bytes_written, recorded_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(item_id) DO UPDATE SET
                gallery_id = excluded.gallery_id,
                outcome = excluded.outcome,
                error_kind = excluded.error_kind,
                attempts = excluded.attempts,
                bytes_written = excluded.bytes_written,
                recorded_at = excluded.recorded_at",
        )
        .bind(item_id)
        .bind(gallery_id)
        .bind(outcome.outcome_kind().as_str())
        .bind(error_kind)
        .bind(i64::from(attempts))
        .bind(i64::try_from(bytes_written).unwrap_or(i64::MAX))
        .bind(unix_now())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Record for one item, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the query fails or the row does not decode.
    pub async fn get(&self, item_id: &str) -> Result<Option<CheckpointRecord>> {
        let row = sqlx::query("SELECT * FROM checkpoint WHERE item_id = ?")
            .bind(item_id)
            .fetch_optional(self.db.pool())
            .await?;
        row.as_ref().map(CheckpointRecord::from_row).transpose()
    }

    /// Items whose last outcome is `failed`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError`] if the query fails or a row does not decode.
    pub async fn failed_items(&self) -> Result<Vec<CheckpointRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM checkpoint WHERE outcome = ? ORDER BY recorded_at, item_id",
        )
        .bind(OutcomeKind::Failed.as_str())
        .fetch_all(self.db.pool())
        .await?;
        rows.iter().map(CheckpointRecord::from_row).collect()
    }

    /// Stored records per outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Database`] if the query fails.
    pub async fn counts(&self) -> Result<CheckpointCounts> {
        let rows = sqlx::query("SELECT outcome, COUNT(*) AS n FROM checkpoint GROUP BY outcome")
            .fetch_all(self.db.pool())
            .await?;
        let mut counts = CheckpointCounts::default();
        for row in &rows {
            let outcome: String = row.try_get("outcome")?;
            let n = u64::try_from(row.try_get::<i64, _>("n")?).unwrap_or(0);
            match outcome.parse::<OutcomeKind>() {
                Ok(OutcomeKind::Completed) => counts.completed = n,
                Ok(OutcomeKind::Failed) => counts.failed = n,
                Ok(OutcomeKind::Skipped) => counts.skipped = n,
                Err(_) => {}
            }
        }
        Ok(counts)
    }

    /// Removes every record. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Database`] if the delete fails.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<u64> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("DELETE FROM checkpoint")
            .execute(self.db.pool())
            .await?;
        info!(removed = result.rows_affected(), "checkpoint cleared");
        Ok(result.rows_affected())
    }

    /// Closes the underlying pool. Later calls fail with a pool-closed error.
    pub async fn close(&self) {
        self.db.pool().close().await;
    }
}
