//! # Transport - Moving Envelopes Between Contexts
//!
//! Contexts share no memory. Everything crossing a context boundary is an
//! immutable, serialized [`Message`](shared_types::Message) envelope carried
//! by a [`Transport`].
//!
//! - [`Transport`]: the port (`send(target, bytes)` / `on_receive(handler)`)
//! - [`InMemoryNetwork`]: in-process endpoints with suspension and loss
//! - [`BusBridge`]: mirrors chosen channels between a local bus and its peers

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bridge;
pub mod memory;
pub mod transport;

pub use bridge::{BridgeError, BridgeStats, BusBridge};
pub use memory::{InMemoryNetwork, MemoryEndpoint, NetworkStats};
pub use transport::{ReceiveHandler, Transport, TransportError};
