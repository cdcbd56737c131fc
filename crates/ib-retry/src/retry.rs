//! The retry loop.

use crate::policy::RetryPolicy;
use std::fmt;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

/// Classification of an operation error.
///
/// The defaults retry everything; override to stop early on caller errors or
/// to pass cancellation straight through.
pub trait Retryable {
    /// Whether another attempt could succeed.
    fn is_retryable(&self) -> bool {
        true
    }

    /// Whether the error reports that the operation was cancelled.
    fn is_cancellation(&self) -> bool {
        false
    }
}

impl Retryable for String {}

impl Retryable for &'static str {}

impl Retryable for std::io::Error {}

/// Terminal outcome of a failed retry loop.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the error of the last one.
    #[error("gave up after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: E,
    },

    /// An attempt failed with a non-retryable error or a cancellation.
    #[error("aborted on attempt {attempt}: {source}")]
    Aborted {
        attempt: u32,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    /// The underlying error of the last attempt.
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::MaxRetriesExceeded { source, .. } | RetryError::Aborted { source, .. } => {
                source
            }
        }
    }

    /// Consume and return the underlying error.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::MaxRetriesExceeded { source, .. } | RetryError::Aborted { source, .. } => {
                source
            }
        }
    }

    /// Number of attempts made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::MaxRetriesExceeded { attempts, .. } => *attempts,
            RetryError::Aborted { attempt, .. } => *attempt,
        }
    }
}

/// Run `operation` until it succeeds or the policy is exhausted.
///
/// `operation` receives the 1-based attempt number.
///
/// # Errors
///
/// - `RetryError::MaxRetriesExceeded` - all attempts failed
/// - `RetryError::Aborted` - an error was non-retryable or a cancellation
pub async fn retry<T, E, F, Fut>(policy: &RetryPolicy, operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    retry_notify(policy, operation, |_, _| {}).await
}

/// [`retry`] with a callback invoked as `on_retry(attempt, &error)` before
/// every wait.
///
/// Dropping the returned future cancels the operation and any pending wait.
///
/// # Errors
///
/// Same as [`retry`].
pub async fn retry_notify<T, E, F, Fut, N>(
    policy: &RetryPolicy,
    mut operation: F,
    mut on_retry: N,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
    N: FnMut(u32, &E),
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        let error = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        if error.is_cancellation() || !error.is_retryable() {
            debug!(attempt, error = %error, "Operation failed, not retrying");
            return Err(RetryError::Aborted {
                attempt,
                source: error,
            });
        }

        if attempt >= max_attempts {
            warn!(attempts = attempt, error = %error, "Retries exhausted");
            return Err(RetryError::MaxRetriesExceeded {
                attempts: attempt,
                source: error,
            });
        }

        on_retry(attempt, &error);
        let wait = policy.delay_after(attempt);
        debug!(
            attempt,
            wait_ms = wait.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying"
        );
        tokio::time::sleep(wait).await;
        attempt += 1;
    }
}
