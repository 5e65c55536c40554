//! Retry/backoff policy for failed jobs.

use chrono::{DateTime, Duration, Utc};

/// Largest exponent applied to the base delay. With the default one-minute
/// base this caps the delay at 2^16 minutes (about 45 days).
pub const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Smallest base delay a policy will use. Zero or negative bases are raised
/// to this so a retry always lands strictly after the failure.
pub const MIN_BASE_DELAY: Duration = Duration::seconds(1);

/// Outcome of the retry decision for a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Return the job to `pending`, eligible again at `at`.
    Retry { at: DateTime<Utc> },
    /// Retries exhausted; the job is permanently failed.
    GiveUp,
}

/// Exponential backoff keyed on the job's attempt counter.
///
/// `attempts` is the value stored on the job when the failure is handled,
/// i.e. after the claim-time increment: the first failure waits
/// `base * 2^1`, the second `base * 2^2`, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay unit multiplied by `2^attempts`. Values below
    /// [`MIN_BASE_DELAY`] are treated as `MIN_BASE_DELAY`.
    pub base_delay: Duration,
    /// Cap on the exponent.
    pub max_exponent: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::minutes(1),
            max_exponent: MAX_BACKOFF_EXPONENT,
        }
    }
}

impl RetryPolicy {
    pub fn with_base_delay(base_delay: Duration) -> Self {
        Self {
            base_delay: base_delay.max(MIN_BASE_DELAY),
            ..Self::default()
        }
    }

    /// Delay before the next run of a job that has made `attempts` attempts.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        let exponent = attempts.min(self.max_exponent).min(30);
        let factor = 1_i32 << exponent;
        self.base_delay
            .max(MIN_BASE_DELAY)
            .checked_mul(factor)
            .unwrap_or(Duration::MAX)
    }

    /// Decide between retry and terminal failure.
    ///
    /// Deterministic in `(attempts, max_attempts, now)`.
    pub fn decide(&self, attempts: u32, max_attempts: u32, now: DateTime<Utc>) -> RetryDecision {
        if attempts >= max_attempts {
            return RetryDecision::GiveUp;
        }

        let at = now
            .checked_add_signed(self.delay_for_attempt(attempts))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        RetryDecision::Retry { at }
    }
}
