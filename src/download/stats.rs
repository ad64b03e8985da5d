//! Statistics Aggregator shared by all workers of one run.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;

use super::TaskOutcome;

/// Per-gallery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GalleryTally {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub bytes: u64,
}

/// Point-in-time copy of the run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub planned: usize,
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub retried: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    /// Items with a terminal outcome.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    /// Average transfer rate since the run started.
    #[must_use]
    pub fn bytes_per_second(&self) -> f64 {
        bytes_per_second(self.bytes, self.elapsed)
    }

    /// Estimated time until every planned task has an outcome, extrapolated
    /// from the pace so far. `None` until the first planned task finishes.
    ///
    /// Items skipped while planning are not planned tasks and do not count.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn eta(&self) -> Option<Duration> {
        let done = (self.completed + self.failed).min(self.planned);
        let remaining = self.planned - done;
        if remaining == 0 {
            return Some(Duration::ZERO);
        }
        if done == 0 || self.elapsed.is_zero() {
            return None;
        }
        let per_task = self.elapsed.as_secs_f64() / done as f64;
        Duration::try_from_secs_f64(per_task * remaining as f64).ok()
    }
}

/// `bytes / elapsed`, or zero before any time has passed.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bytes_per_second(bytes: u64, elapsed: Duration) -> f64 {
    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        bytes as f64 / seconds
    } else {
        0.0
    }
}

/// Thread-safe run counters.
///
/// Workers update through `&self`; every counter is an atomic and the
/// per-gallery map is a `DashMap`, so no outer lock is needed.
#[derive(Debug)]
pub struct Statistics {
    planned: AtomicUsize,
    attempted: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    retried: AtomicUsize,
    bytes: AtomicU64,
    started: Instant,
    frozen: OnceLock<Duration>,
    galleries: DashMap<String, GalleryTally>,
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

impl Statistics {
    #[must_use]
    pub fn new() -> Self {
        Self {
            planned: AtomicUsize::new(0),
            attempted: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            retried: AtomicUsize::new(0),
            bytes: AtomicU64::new(0),
            started: Instant::now(),
            frozen: OnceLock::new(),
            galleries: DashMap::new(),
        }
    }

    #[must_use]
    pub fn planned(&self) -> usize {
        self.planned.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn attempted(&self) -> usize {
        self.attempted.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Number of retry attempts scheduled.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Time since the aggregator was created, or up to [`finish`](Self::finish).
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.frozen
            .get()
            .copied()
            .unwrap_or_else(|| self.started.elapsed())
    }

    /// Stops the clock. Later calls keep the first value.
    pub fn finish(&self) -> Duration {
        *self.frozen.get_or_init(|| self.started.elapsed())
    }

    #[must_use]
    pub fn gallery(&self, gallery_id: &str) -> Option<GalleryTally> {
        self.galleries.get(gallery_id).map(|entry| *entry)
    }

    /// Per-gallery counters sorted by gallery id.
    #[must_use]
    pub fn galleries(&self) -> Vec<(String, GalleryTally)> {
        let mut all: Vec<_> = self
            .galleries
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    #[must_use]
    pub fn bytes_per_second(&self) -> f64 {
        bytes_per_second(self.bytes_transferred(), self.elapsed())
    }

    /// See [`StatsSnapshot::eta`].
    #[must_use]
    pub fn eta(&self) -> Option<Duration> {
        self.snapshot().eta()
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            planned: self.planned(),
            attempted: self.attempted(),
            completed: self.completed(),
            failed: self.failed(),
            skipped: self.skipped(),
            retried: self.retried(),
            bytes: self.bytes_transferred(),
            elapsed: self.elapsed(),
        }
    }

    pub(crate) fn add_planned(&self, count: usize) {
        self.planned.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn increment_attempted(&self) {
        self.attempted.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn increment_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    /// Counts one terminal outcome for `gallery_id`.
    pub(crate) fn record_outcome(&self, gallery_id: &str, outcome: &TaskOutcome) {
        let mut tally = self.galleries.entry(gallery_id.to_string()).or_default();
        match outcome {
            TaskOutcome::Completed { bytes_written, .. } => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                self.bytes.fetch_add(*bytes_written, Ordering::SeqCst);
                tally.completed += 1;
                tally.bytes += bytes_written;
            }
            TaskOutcome::Skipped { .. } => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
                tally.skipped += 1;
            }
            TaskOutcome::Failed { .. } => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                tally.failed += 1;
            }
        }
    }
}
