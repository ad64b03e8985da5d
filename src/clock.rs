//! Wall-clock helpers for persisted timestamps (Unix seconds).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Current time as Unix seconds. Clamps to 0 if the clock is before the epoch.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

/// Converts Unix seconds to a `SystemTime`. Negative values map to the epoch.
#[must_use]
pub fn system_time_from_unix(seconds: i64) -> SystemTime {
    let seconds = u64::try_from(seconds).unwrap_or(0);
    UNIX_EPOCH + Duration::from_secs(seconds)
}
