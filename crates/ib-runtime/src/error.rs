use crate::container::ConfigError;
use ib_liveness::LivenessError;
use ib_transport::BridgeError;
use shared_bus::BusError;
use shared_types::StoreError;
use thiserror::Error;

/// Errors from building or wiring an execution context.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Liveness keeper error: {0}")]
    Liveness(#[from] LivenessError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}
