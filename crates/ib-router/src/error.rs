//! Router errors.

use ib_retry::{RetryError, Retryable};
use shared_bus::BusError;
use shared_types::RequestId;
use thiserror::Error;

/// Terminal outcome of a failed request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The request channel was never created. Not retried.
    #[error("Channel not found: {channel}")]
    ChannelNotFound { channel: String },

    /// Channel names must be non-empty. Not retried.
    #[error("Invalid channel name: {0:?}")]
    InvalidChannelName(String),

    /// No response within the attempt timeout.
    #[error("No response within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    /// The responder reported a failure.
    #[error("Responder failed: {reason}")]
    Remote { reason: String },

    /// The caller cancelled the request.
    #[error("Request cancelled")]
    Cancelled,

    /// Every attempt failed; wraps the cause of the last one.
    #[error("Request failed after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<RequestError>,
    },

    /// A request with this id is already awaiting a response.
    #[error("Request {request_id} is already pending")]
    DuplicateRequest { request_id: RequestId },

    /// The message could not be handed to the bus.
    #[error("Transport failure: {0}")]
    Transport(String),
}

impl RequestError {
    /// The innermost cause, unwrapping `MaxRetriesExceeded`.
    pub fn root_cause(&self) -> &RequestError {
        match self {
            RequestError::MaxRetriesExceeded { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether the request ultimately failed because no response arrived.
    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), RequestError::Timeout { .. })
    }
}

impl Retryable for RequestError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            RequestError::Timeout { .. } | RequestError::Remote { .. } | RequestError::Transport(_)
        )
    }

    fn is_cancellation(&self) -> bool {
        matches!(self, RequestError::Cancelled)
    }
}

impl From<BusError> for RequestError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::ChannelNotFound { channel } => RequestError::ChannelNotFound { channel },
            BusError::InvalidChannelName(name) => RequestError::InvalidChannelName(name),
            other => RequestError::Transport(other.to_string()),
        }
    }
}

impl From<RetryError<RequestError>> for RequestError {
    fn from(err: RetryError<RequestError>) -> Self {
        match err {
            RetryError::MaxRetriesExceeded { attempts, source } => {
                RequestError::MaxRetriesExceeded {
                    attempts,
                    source: Box::new(source),
                }
            }
            RetryError::Aborted { source, .. } => source,
        }
    }
}
