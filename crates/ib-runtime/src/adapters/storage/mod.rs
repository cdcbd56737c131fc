//! # Durable Storage Adapters
//!
//! Backends for the `KeyValueStore` port. Without a state path the context
//! keeps its state in `InMemoryStore` and loses it on restart.

pub mod json_file;

pub use json_file::{JsonFileConfig, JsonFileStore};
pub use shared_types::InMemoryStore;
