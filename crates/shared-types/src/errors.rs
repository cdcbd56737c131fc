//! # Error Types
//!
//! Errors shared by every crate that touches envelopes or the durable store.

use thiserror::Error;

/// Errors from encoding or decoding a wire envelope.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The bytes are not a valid JSON envelope.
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    /// A mandatory envelope field is empty.
    #[error("Envelope field `{field}` must not be empty")]
    EmptyField { field: &'static str },

    /// The encoded envelope exceeds the size limit.
    #[error("Envelope too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },
}

/// Errors from decoding a message into a typed channel union.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MessageDecodeError {
    /// The message belongs to a different channel.
    #[error("Message from channel `{actual}` cannot decode as `{expected}`")]
    WrongChannel {
        expected: &'static str,
        actual: String,
    },

    /// The type tag is not part of the channel's vocabulary.
    #[error("Unknown message type `{message_type}` on channel `{channel}`")]
    UnknownType {
        channel: &'static str,
        message_type: String,
    },

    /// The payload does not match the shape of its type.
    #[error("Invalid payload for `{message_type}`: {reason}")]
    InvalidPayload {
        message_type: String,
        reason: String,
    },
}

/// Errors from the durable key-value store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Reading or writing the backing medium failed.
    #[error("Store I/O error: {0}")]
    Io(String),

    /// A stored value could not be (de)serialized.
    #[error("Store serialization error: {0}")]
    Serialization(String),

    /// The store is not reachable (e.g. its owning context is gone).
    #[error("Store unavailable")]
    Unavailable,
}
