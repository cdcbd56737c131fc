//! # Insight Bus Test Suite
//!
//! Cross-crate scenarios: several execution contexts in one process, each
//! with its own bus, bridged over the in-memory transport.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── support.rs        # Context fixtures and collectors
//! └── integration/
//!     ├── bus_properties.rs
//!     ├── cross_context.rs
//!     └── resilience.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ib-tests
//! cargo test -p ib-tests integration::resilience::
//!
//! # Benchmarks
//! cargo bench -p ib-tests
//! ```

#![allow(dead_code)]

pub mod integration;
pub mod support;
