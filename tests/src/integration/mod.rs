//! # Integration Scenarios
//!
//! - `bus_properties` - delivery, retry and liveness guarantees
//! - `cross_context` - bridged contexts exchanging events and requests
//! - `resilience` - loss, suspension, cancellation and restart

pub mod bus_properties;
pub mod cross_context;
pub mod resilience;
