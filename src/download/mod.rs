//! Item transfer machinery.
//!
//! - [`RetryPolicy`] decides whether and when to retry a classified failure.
//! - [`Transfer`] / [`HttpTransfer`] stream one URL into one destination file.
//! - [`IntegrityVerifier`] checks written files against size and SHA-256.
//! - [`Statistics`] accumulates run counters across workers.
//! - [`WorkerPool`] runs [`DownloadTask`]s under bounded concurrency.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use gallery_core::download::{HttpTransfer, Transfer, DEFAULT_TRANSFER_TIMEOUT};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transfer = HttpTransfer::new()?;
//! let bytes = transfer
//!     .transfer("https://example.com/a.jpg", Path::new("./out/a.jpg"), DEFAULT_TRANSFER_TIMEOUT)
//!     .await?;
//! println!("wrote {bytes} bytes");
//! # Ok(())
//! # }
//! ```

mod constants;
mod error;
mod integrity;
mod pool;
mod retry;
mod stats;
mod task;
mod transfer;

pub use constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CANCEL_GRACE, DEFAULT_CONCURRENCY, DEFAULT_INITIAL_BACKOFF,
    DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES, DEFAULT_TRANSFER_TIMEOUT, MAX_CONCURRENCY,
    MAX_RETRIES_LIMIT, MAX_RETRY_AFTER,
};
pub use error::DownloadError;
pub use integrity::{IntegrityVerifier, Verification, sha256_hex};
pub use pool::{ItemDownload, OutcomeSink, PoolError, PoolReport, RunAbort, WorkerPool};
pub use retry::{RetryDecision, RetryPolicy, parse_retry_after};
pub use stats::{GalleryTally, Statistics, StatsSnapshot, bytes_per_second};
pub use task::{DownloadTask, OutcomeKind, SkipReason, TaskOutcome};
pub use transfer::{HttpTransfer, Transfer, USER_AGENT, part_path_for};
