//! Retry policy for failed attempts.

use std::time::Duration;

/// Pure exponential backoff: the nth retry waits `base * multiplier^n`.
///
/// No jitter and no cap. Arithmetic saturates at [`Duration::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay unit.
    pub base: Duration,

    /// Growth factor per retry.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Doubling backoff with the given base.
    #[must_use]
    pub const fn exponential(base: Duration) -> Self {
        Self {
            base,
            multiplier: 2,
        }
    }

    /// Returns true if a task that has used `current_retry` of
    /// `max_retries` retries may be attempted again.
    #[must_use]
    pub const fn should_retry(&self, current_retry: u32, max_retries: u32) -> bool {
        current_retry < max_retries
    }

    /// Delay before the `retry`th re-attempt (1-based).
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.multiplier
            .checked_pow(retry)
            .and_then(|factor| self.base.checked_mul(factor))
            .unwrap_or(Duration::MAX)
    }
}
