//! The transport port between contexts.

use async_trait::async_trait;
use shared_types::{CodecError, ContextId};
use std::sync::Arc;
use thiserror::Error;

/// Errors from sending across contexts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The target context does not exist or is suspended.
    #[error("Context unreachable: {0}")]
    Unreachable(ContextId),

    /// The local endpoint has been shut down.
    #[error("Transport closed")]
    Closed,

    #[error("Envelope codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Callback for inbound bytes, invoked with the sending context.
pub type ReceiveHandler = Arc<dyn Fn(ContextId, Vec<u8>) + Send + Sync>;

/// Moves serialized envelopes between contexts.
///
/// Delivery is best effort: a successful `send` does not guarantee the peer
/// processes the bytes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The context this endpoint belongs to.
    fn local(&self) -> ContextId;

    /// Send `bytes` to `target`.
    async fn send(&self, target: &ContextId, bytes: Vec<u8>) -> Result<(), TransportError>;

    /// Install the inbound handler, replacing any previous one.
    fn on_receive(&self, handler: ReceiveHandler);

    /// Remove `handler` if it is still the installed one. Inbound bytes are
    /// discarded until another handler is installed.
    fn clear_receive(&self, handler: &ReceiveHandler);
}
