//! Persisted per-item outcome row.

use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use super::CheckpointError;
use crate::download::OutcomeKind;
use crate::failure::ErrorKind;

/// Last known terminal outcome of one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointRecord {
    pub item_id: String,
    pub gallery_id: String,
    pub outcome: OutcomeKind,
    /// Set for failed items.
    pub error_kind: Option<ErrorKind>,
    pub attempts: u32,
    pub bytes_written: u64,
    /// Unix seconds.
    pub recorded_at: i64,
}

impl CheckpointRecord {
    pub(super) fn from_row(row: &SqliteRow) -> Result<Self, CheckpointError> {
        let item_id: String = row.try_get("item_id")?;
        let outcome: String = row.try_get("outcome")?;
        let outcome = outcome
            .parse::<OutcomeKind>()
            .map_err(|reason| CheckpointError::InvalidRecord {
                item_id: item_id.clone(),
                reason,
            })?;
        let error_kind = row
            .try_get::<Option<String>, _>("error_kind")?
            .map(|raw| raw.parse::<ErrorKind>())
            .transpose()
            .map_err(|reason| CheckpointError::InvalidRecord {
                item_id: item_id.clone(),
                reason,
            })?;
        let attempts: i64 = row.try_get("attempts")?;
        let bytes_written: i64 = row.try_get("bytes_written")?;

        Ok(Self {
            gallery_id: row.try_get("gallery_id")?,
            outcome,
            error_kind,
            attempts: u32::try_from(attempts).unwrap_or(0),
            bytes_written: u64::try_from(bytes_written).unwrap_or(0),
            recorded_at: row.try_get("recorded_at")?,
            item_id,
        })
    }
}

/// Number of stored records per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CheckpointCounts {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
}

impl CheckpointCounts {
    #[must_use]
    pub fn total(&self) -> u64 {
        self.completed + self.failed + self.skipped
    }
}
