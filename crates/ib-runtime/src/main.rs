//! `ib-runtime` binary: runs one execution context until Ctrl-C.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`IB_LOG_LEVEL`, `IB_JSON_LOGS`)
//! 2. Load and validate configuration from the environment
//! 3. Build the context (store, bus, channels, router, keeper)
//! 4. Install the background handlers when running as `background`
//! 5. Wait for Ctrl-C, then shut down

use anyhow::{Context, Result};
use ib_runtime::adapters::ExtractiveAnalyzer;
use ib_runtime::{ExtensionContext, RuntimeConfig};
use ib_telemetry::{init_telemetry, TelemetryConfig};
use shared_types::ContextId;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = RuntimeConfig::from_env().context("Failed to load configuration")?;

    let _telemetry = init_telemetry(TelemetryConfig::for_context(&config.context.to_string()))
        .context("Failed to initialize logging")?;

    let mut context = ExtensionContext::open(config)
        .await
        .context("Failed to build execution context")?;

    if context.context_id() == ContextId::Background {
        context
            .install_background(Arc::new(ExtractiveAnalyzer::new()))
            .context("Failed to install background handlers")?;
    }

    info!(
        context = %context.context_id(),
        state_path = ?context.config().storage.state_path,
        "Context is running. Press Ctrl+C to stop."
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    context.shutdown().await;
    Ok(())
}
