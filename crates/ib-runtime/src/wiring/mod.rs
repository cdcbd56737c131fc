//! # Channel Wiring
//!
//! Creates the extension's standard channels and connects the background
//! handlers to them.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         MESSAGE BUS                          │
//! │  insight-content   insight-ui              (persistent, memory)│
//! │  insight-results                          (persistent, durable)│
//! │  router.responses                                  (transient)│
//! └──────┬───────────────────┬──────────────▲────────────────────┘
//!        │                   │              │
//!        ▼                   ▼              │
//!  ContentEvents         UiEvents ──────────┤
//!  ContentRequests ─────────────────────────┘
//! ```

use crate::handlers::background::{BackgroundService, ContentEvents, ContentRequests, UiEvents};
use ib_router::{MessageRouter, RESPONSE_CHANNEL};
use shared_bus::{BusError, Channel, ChannelOptions, MessageBus, Subscription};
use shared_types::messages::{CONTENT_CHANNEL, RESULTS_CHANNEL, UI_CHANNEL};
use std::sync::Arc;
use tracing::{debug, info};

/// Channels every context creates.
pub const STANDARD_CHANNELS: [&str; 3] = [CONTENT_CHANNEL, RESULTS_CHANNEL, UI_CHANNEL];

/// Standard channels whose backlog survives a restart. Commands on the other
/// channels are never replayed into a restarted background.
pub const DURABLE_CHANNELS: [&str; 1] = [RESULTS_CHANNEL];

/// Channels carried across the transport: the standard ones plus responses.
pub const BRIDGED_CHANNELS: [&str; 4] = [CONTENT_CHANNEL, RESULTS_CHANNEL, UI_CHANNEL, RESPONSE_CHANNEL];

/// Create the persistent standard channels, restoring the durable ones from
/// the bus's store.
///
/// # Errors
///
/// `BusError::Store` if a stored backlog could not be read.
pub async fn create_standard_channels(
    bus: &MessageBus,
    backlog_capacity: usize,
) -> Result<Vec<Arc<Channel>>, BusError> {
    let options = ChannelOptions::persistent(backlog_capacity);
    if !options.is_effectively_persistent() {
        debug!("Backlog capacity is zero, standard channels keep no backlog");
    }

    let mut channels = Vec::with_capacity(STANDARD_CHANNELS.len());
    for name in STANDARD_CHANNELS {
        let channel = if DURABLE_CHANNELS.contains(&name) {
            bus.restore_channel(name, options).await?
        } else {
            bus.create_channel(name, options)?
        };
        channels.push(channel);
    }
    Ok(channels)
}

/// Subscribe the background handlers and serve content requests.
///
/// The returned subscriptions keep the handlers attached; dropping them
/// detaches everything.
///
/// # Errors
///
/// `BusError::ChannelNotFound` if the standard channels were not created.
pub fn install_background_handlers(
    router: &MessageRouter,
    service: Arc<BackgroundService>,
) -> Result<Vec<Subscription>, BusError> {
    let bus = router.bus();
    let subscriptions = vec![
        bus.subscribe(CONTENT_CHANNEL, ContentEvents::new(Arc::clone(&service)))?,
        router.serve(CONTENT_CHANNEL, ContentRequests::new(Arc::clone(&service)))?,
        bus.subscribe(UI_CHANNEL, UiEvents::new(service))?,
    ];
    info!(subscriptions = subscriptions.len(), "Background handlers installed");
    Ok(subscriptions)
}
