//! # Shared Bus - Cross-Context Message Bus
//!
//! Named, independently ordered channels with fan-out to subscribers and an
//! optional bounded backlog replayed to late subscribers.
//!
//! ## Delivery Model
//!
//! ```text
//! ┌──────────────┐  publish()   ┌───────────────────────────┐
//! │  Producer    │ ───────────→ │ Channel "insight-results" │
//! └──────────────┘              │  seq counter + backlog    │
//!                               └─────────────┬─────────────┘
//!                         per-subscriber FIFO │ (push under channel lock)
//!                     ┌───────────────────────┼───────────────────────┐
//!                     ↓                       ↓                       ↓
//!              delivery task           delivery task           delivery task
//!                     ↓                       ↓                       ↓
//!                 handler A               handler B               handler C
//! ```
//!
//! - `publish` never waits for handlers.
//! - A failing or panicking handler is logged and counted; other
//!   subscribers and the publisher are unaffected.
//! - A late subscriber to a persistent channel receives the backlog, oldest
//!   first, before any live publish.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod bus;
pub mod channel;
pub mod error;
pub mod persistence;
pub mod queue;
pub mod stats;
pub mod subscriber;

// Re-export main types
pub use bus::MessageBus;
pub use channel::{Channel, ChannelOptions};
pub use error::{BusError, HandlerError};
pub use persistence::backlog_key;
pub use queue::MessageQueue;
pub use stats::{BusStats, BusStatsSnapshot};
pub use subscriber::{
    handler_fn, FnHandler, MessageHandler, MessageStream, Subscription, SubscriptionId,
};

/// Store key prefix under which persistent backlogs are mirrored.
pub const BACKLOG_KEY_PREFIX: &str = "bus.backlog.";
