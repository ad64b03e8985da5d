//! Final report of one orchestration run.

use std::time::Duration;

use serde::Serialize;

use crate::download::{GalleryTally, bytes_per_second};
use crate::failure::ErrorKind;

/// How the run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    /// Every planned task reached a terminal outcome.
    Completed,
    /// The cancel flag stopped the run; unresolved items are left for a resume.
    Cancelled,
    /// A run-fatal item error stopped the run.
    Aborted { kind: ErrorKind, message: String },
}

/// One item that ended `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item_id: String,
    pub gallery_id: String,
    pub kind: ErrorKind,
}

/// A gallery whose item listing could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GalleryFailure {
    pub gallery_id: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Totals and failures produced at `Finalizing`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub retried: usize,
    pub bytes_total: u64,
    pub elapsed: Duration,
    /// Tasks submitted (or, for a dry run, that would be submitted).
    pub planned: usize,
    /// Sum of known item sizes over planned tasks.
    pub planned_bytes: u64,
    pub dry_run: bool,
    pub failures: Vec<ItemFailure>,
    pub gallery_failures: Vec<GalleryFailure>,
    pub galleries: Vec<(String, GalleryTally)>,
}

impl RunReport {
    /// Nothing failed and the run was not stopped early.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed && !self.has_failures()
    }

    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || !self.gallery_failures.is_empty()
    }

    /// Some items completed while others failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.status == RunStatus::Completed && self.has_failures() && self.completed > 0
    }

    /// Average download rate over the whole run.
    #[must_use]
    pub fn bytes_per_second(&self) -> f64 {
        bytes_per_second(self.bytes_total, self.elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(completed: usize, failed: usize, status: RunStatus) -> RunReport {
        RunReport {
            status,
            completed,
            failed,
            skipped: 0,
            retried: 0,
            bytes_total: 0,
            elapsed: Duration::ZERO,
            planned: completed + failed,
            planned_bytes: 0,
            dry_run: false,
            failures: Vec::new(),
            gallery_failures: Vec::new(),
            galleries: Vec::new(),
        }
    }

    #[test]
    fn test_clean_run_is_success() {
        let clean = report(3, 0, RunStatus::Completed);
        assert!(clean.is_success());
        assert!(!clean.is_partial());
    }

    #[test]
    fn test_failures_make_run_partial() {
        let partial = report(8, 2, RunStatus::Completed);
        assert!(!partial.is_success());
        assert!(partial.is_partial());
        assert!(!report(0, 2, RunStatus::Completed).is_partial());
    }

    #[test]
    fn test_report_rate_uses_total_bytes_and_elapsed() {
        let mut run = report(2, 0, RunStatus::Completed);
        assert!(run.bytes_per_second().abs() < f64::EPSILON);
        run.bytes_total = 3000;
        run.elapsed = Duration::from_secs(2);
        assert!((run.bytes_per_second() - 1500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cancelled_run_is_not_success() {
        assert!(!report(3, 0, RunStatus::Cancelled).is_success());
    }

    #[test]
    fn test_gallery_failure_counts_as_failure() {
        let mut with_gallery = report(3, 0, RunStatus::Completed);
        with_gallery.gallery_failures.push(GalleryFailure {
            gallery_id: "g9".to_string(),
            kind: ErrorKind::NotFound,
            message: "gallery g9 not found".to_string(),
        });
        assert!(with_gallery.has_failures());
        assert!(with_gallery.is_partial());
    }
}
