//! # Shared Types Crate
//!
//! Types shared by every context of the extension: the message envelope, its
//! wire codec, identifiers, typed channel vocabularies and the durable store
//! port.
//!
//! ## Design Principles
//!
//! - **Immutable envelopes**: a [`Message`] is stamped once by its channel and
//!   never mutated afterwards; only envelopes cross a context boundary.
//! - **Opaque payloads**: the bus carries `payload` without interpreting it;
//!   typed unions in [`messages`] are decoded at the edges by handlers.

pub mod codec;
pub mod context;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod store;

pub use codec::{EnvelopeCodec, MAX_ENVELOPE_BYTES};
pub use context::{ContextId, ParseContextError};
pub use envelope::{current_timestamp_ms, Draft, Message};
pub use errors::*;
pub use ids::{MessageId, RequestId};
pub use messages::ChannelMessage;
pub use store::{InMemoryStore, KeyValueStore};
