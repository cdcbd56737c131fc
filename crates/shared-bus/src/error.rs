//! Errors returned by bus operations.

use shared_types::{MessageDecodeError, StoreError};
use thiserror::Error;

/// Errors from channel registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The operation referenced a channel that was never created.
    #[error("Channel not found: {channel}")]
    ChannelNotFound { channel: String },

    /// Channel names must be non-empty.
    #[error("Invalid channel name: {0:?}")]
    InvalidChannelName(String),

    /// The durable store failed while restoring a backlog.
    #[error("Backlog store error: {0}")]
    Store(#[from] StoreError),
}

impl BusError {
    pub(crate) fn not_found(channel: &str) -> Self {
        BusError::ChannelNotFound {
            channel: channel.to_string(),
        }
    }
}

/// Error reported by a subscriber's handler.
///
/// Handler errors are contained: they are logged and counted, never returned
/// to the publisher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

impl From<String> for HandlerError {
    fn from(reason: String) -> Self {
        Self(reason)
    }
}

impl From<&str> for HandlerError {
    fn from(reason: &str) -> Self {
        Self(reason.to_string())
    }
}

impl From<MessageDecodeError> for HandlerError {
    fn from(err: MessageDecodeError) -> Self {
        Self(err.to_string())
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        Self(err.to_string())
    }
}
