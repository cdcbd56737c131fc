//! # Message Envelope
//!
//! The immutable unit that flows through a channel and across the transport.
//!
//! ## Wire Shape
//!
//! ```text
//! { id, channel, type, payload, sequence, timestamp, requestId?, isResponse?, origin? }
//! ```
//!
//! - **Ordering**: `sequence` is assigned by the channel at publish time and is
//!   strictly increasing per channel.
//! - **Correlation**: request/response flows use `requestId` and `isResponse`.
//! - **Opaque payload**: the bus never looks inside `payload`.

use crate::context::ContextId;
use crate::ids::{MessageId, RequestId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// A published message. Immutable once the channel has stamped it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique id of this message.
    pub id: MessageId,

    /// Name of the channel this message was published on.
    pub channel: String,

    /// Producer-defined message type, e.g. `quick-analysis`.
    #[serde(rename = "type")]
    pub message_type: String,

    /// Opaque payload understood only by producer and consumer.
    #[serde(default)]
    pub payload: Value,

    /// Per-channel publish sequence number.
    pub sequence: u64,

    /// Publish time in milliseconds since the Unix epoch.
    pub timestamp: u64,

    /// Correlation id for request/response flows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,

    /// Set on the single response to a request.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_response: bool,

    /// Context that first published the message, if it crossed the transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ContextId>,
}

impl Message {
    /// Stamp a draft into a message for `channel` at `sequence`.
    ///
    /// Only a channel should call this; the sequence must come from the
    /// channel's own counter.
    pub fn stamp(channel: &str, sequence: u64, draft: Draft) -> Self {
        Self {
            id: MessageId::new(),
            channel: channel.to_string(),
            message_type: draft.message_type,
            payload: draft.payload,
            sequence,
            timestamp: current_timestamp_ms(),
            request_id: draft.request_id,
            is_response: draft.is_response,
            origin: draft.origin,
        }
    }

    /// Whether this message is a request expecting exactly one response.
    #[must_use]
    pub fn is_request(&self) -> bool {
        self.request_id.is_some() && !self.is_response
    }

    /// Turn a received message back into a draft for re-publishing on
    /// another bus, keeping correlation and origin.
    #[must_use]
    pub fn to_draft(&self) -> Draft {
        Draft {
            message_type: self.message_type.clone(),
            payload: self.payload.clone(),
            request_id: self.request_id,
            is_response: self.is_response,
            origin: self.origin,
        }
    }
}

/// The producer-controlled part of a message, before the channel assigns
/// id, sequence and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    pub message_type: String,
    pub payload: Value,
    pub request_id: Option<RequestId>,
    pub is_response: bool,
    pub origin: Option<ContextId>,
}

impl Draft {
    /// A plain event message.
    pub fn event(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
            request_id: None,
            is_response: false,
            origin: None,
        }
    }

    /// A request tagged with `request_id`.
    pub fn request(message_type: impl Into<String>, payload: Value, request_id: RequestId) -> Self {
        Self {
            request_id: Some(request_id),
            ..Self::event(message_type, payload)
        }
    }

    /// The response to the request tagged with `request_id`.
    pub fn response(message_type: impl Into<String>, payload: Value, request_id: RequestId) -> Self {
        Self {
            request_id: Some(request_id),
            is_response: true,
            ..Self::event(message_type, payload)
        }
    }

    /// Record the context that originally published this draft.
    #[must_use]
    pub fn with_origin(mut self, origin: ContextId) -> Self {
        self.origin = Some(origin);
        self
    }
}

/// Current Unix time in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
