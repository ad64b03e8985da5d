//! Scheduled transfers and their terminal outcomes.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::failure::ErrorKind;
use crate::hierarchy::RemoteItem;

/// One scheduled transfer.
///
/// `attempt` counts attempts started so far; `current_delay` is the backoff
/// the task last slept (zero before the first retry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub item: RemoteItem,
    pub destination: PathBuf,
    pub attempt: u32,
    pub current_delay: Duration,
}

impl DownloadTask {
    #[must_use]
    pub fn new(item: RemoteItem, destination: PathBuf) -> Self {
        Self {
            item,
            destination,
            attempt: 0,
            current_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn item_id(&self) -> &str {
        &self.item.id
    }
}

/// Why an item was not transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Checkpoint says a previous run completed it.
    AlreadyCompleted,
    /// The destination exists and verifies.
    AlreadyExists,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlreadyCompleted => "already_completed",
            Self::AlreadyExists => "already_exists",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal result of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed {
        bytes_written: u64,
        duration: Duration,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        kind: ErrorKind,
        attempts: u32,
    },
}

impl TaskOutcome {
    #[must_use]
    pub fn outcome_kind(&self) -> OutcomeKind {
        match self {
            Self::Completed { .. } => OutcomeKind::Completed,
            Self::Skipped { .. } => OutcomeKind::Skipped,
            Self::Failed { .. } => OutcomeKind::Failed,
        }
    }
}

/// Outcome tag as persisted in the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Completed,
    Failed,
    Skipped,
}

impl OutcomeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutcomeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown outcome: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_task_starts_fresh() {
        let task = DownloadTask::new(RemoteItem::new("p1", "g1", "a.jpg"), PathBuf::from("/o/a.jpg"));
        assert_eq!(task.attempt, 0);
        assert_eq!(task.current_delay, Duration::ZERO);
        assert_eq!(task.item_id(), "p1");
    }

    #[test]
    fn test_outcome_kind_round_trips_through_str() {
        for kind in [OutcomeKind::Completed, OutcomeKind::Failed, OutcomeKind::Skipped] {
            assert_eq!(kind.as_str().parse::<OutcomeKind>().unwrap(), kind);
        }
        assert!("done".parse::<OutcomeKind>().is_err());
    }

    #[test]
    fn test_outcome_kind_of_outcomes() {
        let failed = TaskOutcome::Failed {
            kind: ErrorKind::NotFound,
            attempts: 1,
        };
        assert_eq!(failed.outcome_kind(), OutcomeKind::Failed);
        let skipped = TaskOutcome::Skipped {
            reason: SkipReason::AlreadyExists,
        };
        assert_eq!(skipped.outcome_kind(), OutcomeKind::Skipped);
    }
}
