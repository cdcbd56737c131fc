//! # Telemetry
//!
//! Structured logging for bus contexts, built on `tracing-subscriber`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ib_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `IB_LOG_LEVEL` / `RUST_LOG` | `info` | Log filter directive |
//! | `IB_JSON_LOGS` | `false` | JSON output |
//! | `IB_CONTEXT` | `background` | Context name in the service label |
//! | `IB_SERVICE_NAME` | `insight-bus` | Service label |

#![cfg_attr(test, allow(clippy::unwrap_used))]

mod config;
mod logging;

pub use config::{parse_flag, TelemetryConfig, DEFAULT_SERVICE_NAME};
pub use logging::{build_filter, init_logging};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("Invalid log filter {0}")]
    InvalidFilter(String),
}

/// Initialize logging for this process.
///
/// Safe to call more than once; only the first call installs a subscriber.
///
/// # Errors
///
/// `TelemetryError::InvalidFilter` if the configured level does not parse.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let installed = init_logging(&config)?;
    Ok(TelemetryGuard { config, installed })
}

/// Guard held for the lifetime of the application.
pub struct TelemetryGuard {
    config: TelemetryConfig,
    installed: bool,
}

impl TelemetryGuard {
    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Whether this call installed the global subscriber.
    pub fn installed(&self) -> bool {
        self.installed
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.installed {
            tracing::info!(service = %self.config.full_service_name(), "Shutting down telemetry");
        }
    }
}
