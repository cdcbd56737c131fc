//! # Retry - Bounded Retries With Backoff
//!
//! Runs an async operation up to `max_retries` times, waiting `delay`
//! (doubled after every failure when `backoff` is set) between attempts.
//!
//! ```text
//! attempt 1 ──✗── wait delay ── attempt 2 ──✗── wait 2·delay ── attempt 3 ──✗── MaxRetriesExceeded(last error)
//! ```
//!
//! Errors opt out of retrying through [`Retryable`]; cancellation is never
//! swallowed.
//!
//! [`RetryPolicy`] is plain `Copy` data (`max_retries`, `delay`, `backoff`,
//! `max_delay`) so it can sit in configuration and be shared freely. The
//! `on_retry(attempt, &error)` hook is not part of it: pass it to
//! [`retry_notify`], which calls it before every wait. [`retry`] is
//! `retry_notify` without a hook.
//!
//! ```ignore
//! let policy = RetryPolicy::default().with_delay(Duration::from_millis(200));
//! let value = retry_notify(&policy, |attempt| fetch(attempt), |attempt, err| {
//!     warn!(attempt, %err, "retrying");
//! })
//! .await?;
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod policy;
pub mod retry;

pub use policy::{RetryPolicy, DEFAULT_DELAY, DEFAULT_MAX_RETRIES};
pub use retry::{retry, retry_notify, RetryError, Retryable};
