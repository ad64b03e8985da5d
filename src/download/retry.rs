//! Retry logic with exponential backoff for failed transfers.
//!
//! The [`RetryPolicy`] looks only at the [`ErrorKind`] of a failure and the
//! number of the attempt that just failed. It holds no mutable state, so every
//! worker can consult the same policy.
//!
//! # Example
//!
//! ```
//! use gallery_core::download::{RetryDecision, RetryPolicy};
//! use gallery_core::ErrorKind;
//!
//! let policy = RetryPolicy::default();
//! match policy.should_retry(ErrorKind::ServerError, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("attempt {attempt} in {delay:?}");
//!     }
//!     RetryDecision::GiveUp { reason } => println!("giving up: {reason}"),
//! }
//! ```

use std::time::{Duration, SystemTime};

use rand::Rng;
use tracing::{debug, instrument, warn};

use super::constants::{
    DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF, DEFAULT_MAX_RETRIES, MAX_RETRY_AFTER,
};
use crate::failure::ErrorKind;

/// Decision on whether to retry a failed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long the task sleeps before its next attempt.
        delay: Duration,
        /// Number of the next attempt (1-indexed, so the first retry is attempt 2).
        attempt: u32,
    },

    /// Record the item as failed.
    GiveUp {
        /// Human-readable reason why no retry is attempted.
        reason: String,
    },
}

/// Backoff configuration.
///
/// ```text
/// base(n)  = min(max_backoff, initial_backoff * 2^(n-1))
/// delay(n) = base(n) + uniform jitter in [0, base(n)]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    max_retries: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_backoff` is raised to `initial_backoff` if lower.
    #[must_use]
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
        }
    }

    /// Creates a policy with a custom retry count, using defaults for the delays.
    #[must_use]
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts an always-failing retryable item receives.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decides whether to retry after `attempt` (1-indexed) failed with `kind`.
    #[must_use]
    pub fn should_retry(&self, kind: ErrorKind, attempt: u32) -> RetryDecision {
        self.decide_with_rng(kind, attempt, None, &mut rand::thread_rng())
    }

    /// Like [`should_retry`](Self::should_retry), honouring a delay requested
    /// by the remote. The hint replaces the computed backoff for rate limits.
    #[must_use]
    pub fn decide(
        &self,
        kind: ErrorKind,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> RetryDecision {
        self.decide_with_rng(kind, attempt, retry_after, &mut rand::thread_rng())
    }

    /// Decision with an explicit random source, for deterministic jitter.
    #[instrument(skip(self, rng), fields(max_retries = self.max_retries))]
    pub fn decide_with_rng<R: Rng>(
        &self,
        kind: ErrorKind,
        attempt: u32,
        retry_after: Option<Duration>,
        rng: &mut R,
    ) -> RetryDecision {
        if !kind.is_retryable() {
            return RetryDecision::GiveUp {
                reason: format!("{} is not retryable", kind.label()),
            };
        }

        if attempt > self.max_retries {
            debug!(attempt, "retry budget exhausted");
            return RetryDecision::GiveUp {
                reason: format!("gave up after {attempt} attempts"),
            };
        }

        let delay = match (kind, retry_after) {
            (ErrorKind::RateLimited, Some(hint)) => hint.min(MAX_RETRY_AFTER),
            _ => {
                let base = self.base_delay(attempt);
                base + jitter(base, rng)
            }
        };

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Backoff before jitter for the retry following `attempt`.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1_u32 << exponent)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}

fn jitter<R: Rng>(base: Duration, rng: &mut R) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(rng.gen_range(0..=base_ms))
}

/// Parses a Retry-After header value (integer seconds or HTTP-date).
///
/// Values above one hour are capped; dates in the past yield zero.
#[must_use]
#[instrument]
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let header_value = header_value.trim();

    if let Ok(seconds) = header_value.parse::<i64>() {
        let Ok(seconds) = u64::try_from(seconds) else {
            debug!(seconds, "negative Retry-After value, ignoring");
            return None;
        };
        return Some(cap_retry_after(Duration::from_secs(seconds)));
    }

    if let Ok(datetime) = httpdate::parse_http_date(header_value) {
        return match datetime.duration_since(SystemTime::now()) {
            Ok(duration) => Some(cap_retry_after(duration)),
            Err(_) => {
                debug!(header_value, "Retry-After date is in the past, returning zero");
                Some(Duration::ZERO)
            }
        };
    }

    debug!(header_value, "unparseable Retry-After value");
    None
}

fn cap_retry_after(duration: Duration) -> Duration {
    if duration > MAX_RETRY_AFTER {
        warn!(
            delay_secs = duration.as_secs(),
            max_secs = MAX_RETRY_AFTER.as_secs(),
            "Retry-After exceeds maximum, capping at 1 hour"
        );
        return MAX_RETRY_AFTER;
    }
    duration
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    // ==================== RetryPolicy Tests ====================

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), 5);
        assert_eq!(policy.max_attempts(), 6);
        assert_eq!(policy.base_delay(1), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_policy_raises_max_to_initial() {
        let policy = RetryPolicy::new(1, Duration::from_secs(10), Duration::from_secs(2));
        assert_eq!(policy.base_delay(1), Duration::from_secs(10));
        assert_eq!(policy.base_delay(4), Duration::from_secs(10));
    }

    #[test]
    fn test_base_delay_doubles_then_caps() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(60));
        let delays: Vec<u64> = (1..=8).map(|n| policy.base_delay(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 32, 60, 60]);
    }

    #[test]
    fn test_base_delay_is_monotonic_and_capped() {
        let policy = RetryPolicy::new(50, Duration::from_millis(250), Duration::from_secs(45));
        let mut previous = Duration::ZERO;
        for attempt in 1..=50 {
            let delay = policy.base_delay(attempt);
            assert!(delay >= previous, "attempt {attempt} decreased");
            assert!(delay <= Duration::from_secs(45));
            previous = delay;
        }
        assert_eq!(previous, Duration::from_secs(45));
    }

    #[test]
    fn test_base_delay_survives_huge_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_retryable_kinds_retry_until_budget_spent() {
        let policy = RetryPolicy::with_max_retries(3);
        for attempt in 1..=3 {
            assert!(matches!(
                policy.should_retry(ErrorKind::TransientNetwork, attempt),
                RetryDecision::Retry { attempt: next, .. } if next == attempt + 1
            ));
        }
        assert!(matches!(
            policy.should_retry(ErrorKind::TransientNetwork, 4),
            RetryDecision::GiveUp { .. }
        ));
    }

    #[test]
    fn test_zero_retries_gives_up_immediately() {
        let policy = RetryPolicy::with_max_retries(0);
        assert!(matches!(
            policy.should_retry(ErrorKind::ServerError, 1),
            RetryDecision::GiveUp { .. }
        ));
    }

    #[test]
    fn test_non_retryable_kinds_give_up_regardless_of_attempt() {
        let policy = RetryPolicy::with_max_retries(50);
        for kind in [
            ErrorKind::AuthenticationFailed,
            ErrorKind::Forbidden,
            ErrorKind::NotFound,
            ErrorKind::DiskFull,
            ErrorKind::PermissionDenied,
            ErrorKind::InvalidDestination,
        ] {
            assert!(
                matches!(policy.should_retry(kind, 1), RetryDecision::GiveUp { .. }),
                "{kind} should not retry"
            );
        }
    }

    #[test]
    fn test_jitter_within_bounds() {
        let policy = RetryPolicy::new(10, Duration::from_secs(2), Duration::from_secs(60));
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let RetryDecision::Retry { delay, .. } =
                policy.decide_with_rng(ErrorKind::ServerError, 3, None, &mut rng)
            else {
                panic!("expected retry");
            };
            assert!(delay >= Duration::from_secs(8));
            assert!(delay <= Duration::from_secs(16));
        }
    }

    #[test]
    fn test_jitter_is_deterministic_for_seed() {
        let policy = RetryPolicy::default();
        let first = policy.decide_with_rng(
            ErrorKind::TransientNetwork,
            2,
            None,
            &mut StdRng::seed_from_u64(42),
        );
        let second = policy.decide_with_rng(
            ErrorKind::TransientNetwork,
            2,
            None,
            &mut StdRng::seed_from_u64(42),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_rate_limit_hint_replaces_backoff() {
        let policy = RetryPolicy::default();
        let decision = policy.decide(ErrorKind::RateLimited, 1, Some(Duration::from_secs(17)));
        assert_eq!(
            decision,
            RetryDecision::Retry {
                delay: Duration::from_secs(17),
                attempt: 2
            }
        );
    }

    #[test]
    fn test_hint_ignored_for_other_kinds() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(60));
        let RetryDecision::Retry { delay, .. } =
            policy.decide(ErrorKind::ServerError, 1, Some(Duration::from_secs(900)))
        else {
            panic!("expected retry");
        };
        assert!(delay <= Duration::from_secs(2));
    }

    // ==================== Retry-After Tests ====================

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 0 "), Some(Duration::ZERO));
    }

    #[test]
    fn test_parse_retry_after_negative_and_garbage() {
        assert_eq!(parse_retry_after("-5"), None);
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_parse_retry_after_caps_at_one_hour() {
        assert_eq!(parse_retry_after("86400"), Some(MAX_RETRY_AFTER));
    }

    #[test]
    fn test_parse_retry_after_past_http_date_is_zero() {
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn test_parse_retry_after_future_http_date() {
        let future = SystemTime::now() + Duration::from_secs(120);
        let header = httpdate::fmt_http_date(future);
        let parsed = parse_retry_after(&header).unwrap();
        assert!(parsed <= Duration::from_secs(120));
        assert!(parsed >= Duration::from_secs(100));
    }
}
