//! Validated settings for one orchestration run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::cache::{CACHE_TTL_HOURS_RANGE, DEFAULT_CACHE_TTL_HOURS};
use crate::download::{
    DEFAULT_CANCEL_GRACE, DEFAULT_CONCURRENCY, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF,
    DEFAULT_MAX_RETRIES, DEFAULT_TRANSFER_TIMEOUT, MAX_CONCURRENCY, MAX_RETRIES_LIMIT, RetryPolicy,
};
use crate::hierarchy::GalleryFilter;

/// Directory under the output root holding cache and checkpoint state.
pub const STATE_DIR_NAME: &str = ".gallery-downloader";

const CACHE_DIR_NAME: &str = "cache";
const CHECKPOINT_FILE_NAME: &str = "checkpoint.db";

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("concurrency must be between 1 and {MAX_CONCURRENCY}, got {0}")]
    Concurrency(usize),

    #[error("max retries must be at most {MAX_RETRIES_LIMIT}, got {0}")]
    MaxRetries(u32),

    #[error("initial backoff must be greater than zero")]
    InitialBackoff,

    #[error("max backoff ({max:?}) must exceed initial backoff ({initial:?})")]
    MaxBackoff { initial: Duration, max: Duration },

    #[error("transfer timeout must be greater than zero")]
    TransferTimeout,

    #[error("cache TTL must be between 1 and 168 hours, got {0}")]
    CacheTtl(u32),

    #[error("output directory must not be empty")]
    OutputDir,

    #[error("overwrite cannot be combined with retry-failed-only")]
    OverwriteWithRetryFailed,
}

/// Gallery selection criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    /// Case-insensitive regex matched against gallery titles.
    pub title_pattern: Option<String>,
    /// Restrict the walk to this folder or gallery.
    pub node_id: Option<String>,
    /// Deepest level below the start node to include.
    pub max_depth: Option<usize>,
}

/// Everything an orchestration run needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub output_dir: PathBuf,
    pub concurrency: usize,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub transfer_timeout: Duration,
    pub verify_integrity: bool,
    pub preserve_timestamps: bool,
    pub use_cache: bool,
    /// Invalidate the cache before enumerating.
    pub refresh_cache: bool,
    pub cache_ttl_hours: u32,
    /// Ignore the checkpoint skip-set and existing files.
    pub overwrite: bool,
    pub filter: FilterConfig,
    /// Stop after building the task list.
    pub dry_run: bool,
    /// Only retry items the checkpoint marks as failed.
    pub retry_failed_only: bool,
    pub cancel_grace: Duration,
}

impl RunConfig {
    /// Defaults for downloading into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            verify_integrity: true,
            preserve_timestamps: true,
            use_cache: true,
            refresh_cache: false,
            cache_ttl_hours: DEFAULT_CACHE_TTL_HOURS,
            overwrite: false,
            filter: FilterConfig::default(),
            dry_run: false,
            retry_failed_only: false,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    /// Checks every range and cross-field constraint.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::OutputDir);
        }
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::Concurrency(self.concurrency));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::MaxRetries(self.max_retries));
        }
        if self.initial_backoff.is_zero() {
            return Err(ConfigError::InitialBackoff);
        }
        if self.max_backoff <= self.initial_backoff {
            return Err(ConfigError::MaxBackoff {
                initial: self.initial_backoff,
                max: self.max_backoff,
            });
        }
        if self.transfer_timeout.is_zero() {
            return Err(ConfigError::TransferTimeout);
        }
        if !CACHE_TTL_HOURS_RANGE.contains(&self.cache_ttl_hours) {
            return Err(ConfigError::CacheTtl(self.cache_ttl_hours));
        }
        if self.overwrite && self.retry_failed_only {
            return Err(ConfigError::OverwriteWithRetryFailed);
        }
        Ok(())
    }

    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        state_dir_for(&self.output_dir)
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.state_dir().join(CACHE_DIR_NAME)
    }

    #[must_use]
    pub fn checkpoint_path(&self) -> PathBuf {
        self.state_dir().join(CHECKPOINT_FILE_NAME)
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, self.initial_backoff, self.max_backoff)
    }

    #[must_use]
    pub fn gallery_filter(&self) -> GalleryFilter {
        GalleryFilter::new(
            self.filter.title_pattern.as_deref(),
            self.filter.node_id.clone(),
            self.filter.max_depth,
        )
    }
}

/// State directory for a given output root.
#[must_use]
pub fn state_dir_for(output_dir: &Path) -> PathBuf {
    output_dir.join(STATE_DIR_NAME)
}
