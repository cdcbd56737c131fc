//! # Insight Bus Context Runtime
//!
//! Builds one execution context of the extension: durable store, message
//! bus, standard channels, router, liveness keeper and, in the background
//! context, the handlers that answer content scripts and UI documents.
//!
//! The main entry point is the `ib-runtime` binary; the library exposes the
//! same pieces so tests can assemble several contexts in one process.
//!
//! ## Layout
//!
//! - `container/` - configuration and the [`ExtensionContext`] container
//! - `adapters/` - store and analyzer implementations
//! - `handlers/` - background message handlers
//! - `wiring/` - standard channels and handler subscriptions

#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod container;
pub mod error;
pub mod handlers;
pub mod wiring;

pub use container::{ConfigError, ExtensionContext, RuntimeConfig};
pub use error::RuntimeError;
pub use wiring::{BRIDGED_CHANNELS, DURABLE_CHANNELS, STANDARD_CHANNELS};
