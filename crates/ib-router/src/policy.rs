//! Per-request policy.

use ib_retry::RetryPolicy;
use std::time::Duration;

/// Default time to wait for a response to a single attempt.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Attempt timeout plus the retry schedule applied across attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPolicy {
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl RequestPolicy {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Worst-case time before a request gives up.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.timeout
            .saturating_mul(self.retry.attempts())
            .saturating_add(self.retry.total_wait())
    }
}
