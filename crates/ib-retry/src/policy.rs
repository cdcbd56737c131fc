//! Retry policy configuration.

use std::time::Duration;

/// Default number of attempts (including the first).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default wait after the first failed attempt.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(1000);

/// How many times to attempt an operation and how long to wait in between.
///
/// `max_retries` counts attempts, not re-attempts: `max_retries = 3` runs the
/// operation at most three times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts. Values below 1 are treated as 1.
    pub max_retries: u32,
    /// Wait after the first failure.
    pub delay: Duration,
    /// Double the wait after every failure.
    pub backoff: bool,
    /// Upper bound for a single wait.
    pub max_delay: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_DELAY,
            backoff: true,
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn once() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: bool) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Effective attempt limit (at least 1).
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    /// Wait between attempt `attempt` (1-based, just failed) and the next one.
    ///
    /// `delay` without backoff, `delay * 2^(attempt-1)` with backoff, capped
    /// by `max_delay`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let wait = if self.backoff {
            let factor = 1u32
                .checked_shl(attempt.saturating_sub(1))
                .unwrap_or(u32::MAX);
            self.delay.saturating_mul(factor)
        } else {
            self.delay
        };
        self.max_delay.map_or(wait, |cap| wait.min(cap))
    }

    /// Sum of all waits if every attempt fails.
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        (1..self.attempts()).map(|a| self.delay_after(a)).sum()
    }
}
