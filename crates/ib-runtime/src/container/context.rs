//! # Extension Context
//!
//! Everything one execution context needs, constructed explicitly and owned
//! in one place. There is no global bus: tests build as many contexts as
//! they like and wire them together over an in-memory transport.
//!
//! ## Build Order
//!
//! ```text
//! 1. Validate configuration
//! 2. Durable store (JSON file or in-memory)
//! 3. Message bus backed by the store
//! 4. Standard channels; `insight-results` is restored from its stored backlog
//! 5. Router (creates router.responses)
//! 6. Liveness keeper (suspendable contexts only)
//! ```
//!
//! Background handlers and the transport bridge are attached afterwards.

use crate::adapters::analyzer::Analyzer;
use crate::adapters::storage::{InMemoryStore, JsonFileConfig, JsonFileStore};
use crate::container::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::handlers::background::BackgroundService;
use crate::wiring::{create_standard_channels, install_background_handlers, BRIDGED_CHANNELS};
use ib_liveness::{KeeperHandle, LivenessConfig, LivenessKeeper};
use ib_router::MessageRouter;
use ib_transport::{BridgeStats, BusBridge, Transport};
use shared_bus::{MessageBus, Subscription};
use shared_types::{ContextId, KeyValueStore};
use std::sync::Arc;
use tracing::{info, instrument};

/// Container for one execution context.
pub struct ExtensionContext {
    config: RuntimeConfig,
    store: Arc<dyn KeyValueStore>,
    bus: Arc<MessageBus>,
    router: Arc<MessageRouter>,
    keeper: Option<KeeperHandle>,
    subscriptions: Vec<Subscription>,
    bridge: Option<BusBridge>,
}

impl ExtensionContext {
    /// Open the store named by the configuration and build the context.
    ///
    /// # Errors
    ///
    /// `RuntimeError` if the configuration is invalid, the state file cannot
    /// be opened, or a stored backlog cannot be restored.
    pub async fn open(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;
        let store: Arc<dyn KeyValueStore> = match &config.storage.state_path {
            Some(path) => Arc::new(JsonFileStore::open(JsonFileConfig::new(path)).await?),
            None => Arc::new(InMemoryStore::new()),
        };
        Self::build(config, store).await
    }

    /// Build the context on top of an existing store.
    ///
    /// Backlogs are keyed by channel name, so two contexts must not share a
    /// store.
    ///
    /// # Errors
    ///
    /// `RuntimeError` if the configuration is invalid or a stored backlog
    /// cannot be restored.
    #[instrument(skip_all, fields(context = %config.context))]
    pub async fn build(config: RuntimeConfig, store: Arc<dyn KeyValueStore>) -> Result<Self, RuntimeError> {
        config.validate()?;

        let bus = Arc::new(MessageBus::with_store(Arc::clone(&store)));
        create_standard_channels(&bus, config.channels.backlog_capacity).await?;
        let router = Arc::new(MessageRouter::with_policy(
            Arc::clone(&bus),
            config.request_policy(),
        )?);

        let keeper = match config.liveness.period {
            Some(period) if config.context.is_suspendable() => Some(LivenessKeeper::start(
                Arc::clone(&store),
                LivenessConfig::with_period(period),
            )?),
            _ => None,
        };

        info!(
            channels = bus.channel_names().len(),
            keeper = keeper.is_some(),
            "Execution context ready"
        );

        Ok(Self {
            config,
            store,
            bus,
            router,
            keeper,
            subscriptions: Vec::new(),
            bridge: None,
        })
    }

    /// Attach the background handlers (settings, history, analysis).
    ///
    /// # Errors
    ///
    /// `RuntimeError::Bus` if the standard channels are missing.
    pub fn install_background(&mut self, analyzer: Arc<dyn Analyzer>) -> Result<(), RuntimeError> {
        let service = Arc::new(BackgroundService::new(
            Arc::clone(&self.bus),
            Arc::clone(&self.store),
            analyzer,
        ));
        let subscriptions = install_background_handlers(&self.router, service)?;
        self.subscriptions.extend(subscriptions);
        Ok(())
    }

    /// Bridge the standard channels and router responses to `peers`.
    ///
    /// Replaces any previously attached bridge.
    ///
    /// # Errors
    ///
    /// `RuntimeError::Bridge` if a bridged channel is missing.
    pub fn attach_transport(
        &mut self,
        transport: Arc<dyn Transport>,
        peers: Vec<ContextId>,
    ) -> Result<(), RuntimeError> {
        let bridge = BusBridge::attach(Arc::clone(&self.bus), transport, peers, &BRIDGED_CHANNELS)?;
        self.bridge = Some(bridge);
        Ok(())
    }

    pub fn context_id(&self) -> ContextId {
        self.config.context
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn router(&self) -> &Arc<MessageRouter> {
        &self.router
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Keeper store accesses, if a keeper runs in this context.
    pub fn keeper_accesses(&self) -> Option<u64> {
        self.keeper.as_ref().map(KeeperHandle::accesses)
    }

    pub fn bridge_stats(&self) -> Option<BridgeStats> {
        self.bridge.as_ref().map(BusBridge::stats)
    }

    /// Detach handlers and the bridge, then stop the keeper.
    pub async fn shutdown(mut self) {
        self.bridge = None;
        self.subscriptions.clear();
        if let Some(keeper) = self.keeper.take() {
            keeper.stop().await;
        }

        let stats = self.bus.stats();
        info!(
            context = %self.config.context,
            published = stats.published,
            delivered = stats.delivered,
            handler_failures = stats.handler_failures,
            "Execution context shut down"
        );
    }
}
