//! Constants for the download module (timeouts, concurrency, backoff).

use std::time::Duration;

/// HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-transfer timeout (30 seconds).
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of simultaneous transfers.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Upper bound for configured concurrency.
pub const MAX_CONCURRENCY: usize = 20;

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Upper bound for configured retries.
pub const MAX_RETRIES_LIMIT: u32 = 50;

/// Default delay before the first retry.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Default cap for backoff delays.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Maximum Retry-After value (1 hour) to prevent excessive delays.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// How long in-flight transfers may run after cancellation before they are aborted.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Extension appended to files while they are being written.
pub const PART_EXTENSION: &str = "part";
