//! Exit code logic for the downloader process.
//!
//! Single responsibility: map a run report to the process exit outcome.

use gallery_core::{RunReport, RunStatus};

use crate::ProcessExit;

/// Determines the process exit outcome from completed and failed counts.
pub(crate) fn determine_exit_outcome(completed: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

/// Cancelled and aborted runs always fail; otherwise counts decide.
pub(crate) fn exit_for_report(report: &RunReport) -> ProcessExit {
    if report.status != RunStatus::Completed {
        return ProcessExit::Failure;
    }
    let failed = report.failed + report.gallery_failures.len();
    determine_exit_outcome(report.completed, failed)
}
