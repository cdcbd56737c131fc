//! # Context Container
//!
//! Configuration and the per-context container holding the bus, router,
//! store and keeper with their lifetimes tied together.

pub mod config;
pub mod context;

pub use config::{ConfigError, RuntimeConfig};
pub use context::ExtensionContext;
