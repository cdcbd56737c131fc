//! # Message Bus
//!
//! Registry of channels and the publish/subscribe surface every context uses.
//!
//! One bus is explicitly constructed per execution context and passed to the
//! components that need it; there is no global instance, so tests can build
//! as many isolated buses as they like.

use crate::channel::{Channel, ChannelOptions};
use crate::error::BusError;
use crate::persistence::{load_backlog, BacklogWriter};
use crate::stats::{BusStats, BusStatsSnapshot};
use crate::subscriber::{spawn_delivery, MessageHandler, MessageStream, Subscription};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use shared_types::{ChannelMessage, Draft, KeyValueStore, Message};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// In-process message bus.
///
/// `publish` and `subscribe` never await. Delivery runs on per-subscription
/// tasks, so both require a tokio runtime to be current.
pub struct MessageBus {
    channels: DashMap<String, Arc<Channel>>,
    stats: Arc<BusStats>,
    store: Option<Arc<dyn KeyValueStore>>,
}

impl MessageBus {
    /// Create a bus without backlog persistence.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
            stats: Arc::new(BusStats::default()),
            store: None,
        }
    }

    /// Create a bus that can mirror persistent backlogs into `store`.
    ///
    /// Only channels opened with [`restore_channel`](Self::restore_channel)
    /// are mirrored; [`create_channel`](Self::create_channel) keeps its
    /// backlog in memory.
    #[must_use]
    pub fn with_store(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new()
        }
    }

    /// Create a channel, or return the existing one with that name.
    ///
    /// Options of an existing channel are never changed by a second call,
    /// and its backlog and subscribers are kept. The backlog lives in memory
    /// only, even on a bus with a store.
    ///
    /// # Errors
    ///
    /// - `BusError::InvalidChannelName` - `name` is empty
    pub fn create_channel(
        &self,
        name: &str,
        options: ChannelOptions,
    ) -> Result<Arc<Channel>, BusError> {
        Self::validate_name(name)?;

        match self.channels.entry(name.to_string()) {
            Entry::Occupied(existing) => {
                let channel = Arc::clone(existing.get());
                if channel.options() != options {
                    debug!(
                        channel = %name,
                        existing = ?channel.options(),
                        requested = ?options,
                        "Channel already exists, keeping original options"
                    );
                }
                Ok(channel)
            }
            Entry::Vacant(slot) => {
                let channel = Arc::new(Channel::new(
                    name.to_string(),
                    options,
                    Arc::clone(&self.stats),
                    None,
                ));
                slot.insert(Arc::clone(&channel));
                info!(
                    channel = %name,
                    persistent = options.persistent,
                    max_backlog = options.max_backlog,
                    "Channel created"
                );
                Ok(channel)
            }
        }
    }

    /// Create a durable channel: its backlog is loaded from the store and
    /// every later change is written back.
    ///
    /// Without a store this behaves like [`create_channel`](Self::create_channel).
    /// An existing channel is returned unchanged.
    ///
    /// # Errors
    ///
    /// - `BusError::InvalidChannelName` - `name` is empty
    /// - `BusError::Store` - the stored backlog could not be read
    pub async fn restore_channel(
        &self,
        name: &str,
        options: ChannelOptions,
    ) -> Result<Arc<Channel>, BusError> {
        Self::validate_name(name)?;

        let Some(store) = self.store.clone() else {
            return self.create_channel(name, options);
        };
        if let Some(existing) = self.channel(name) {
            return Ok(existing);
        }

        let restored = load_backlog(store.as_ref(), name).await?;
        let restored_len = restored.len();

        match self.channels.entry(name.to_string()) {
            Entry::Occupied(existing) => Ok(Arc::clone(existing.get())),
            Entry::Vacant(slot) => {
                let channel = Arc::new(Channel::with_backlog(
                    name.to_string(),
                    options,
                    Arc::clone(&self.stats),
                    self.writer_for(name, options),
                    restored,
                ));
                slot.insert(Arc::clone(&channel));
                info!(channel = %name, restored = restored_len, "Channel restored");
                Ok(channel)
            }
        }
    }

    /// Look up a channel by exact name.
    #[must_use]
    pub fn channel(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.get(name).map(|c| Arc::clone(c.value()))
    }

    /// Names of all channels, sorted.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }

    /// Publish an event message.
    ///
    /// # Errors
    ///
    /// - `BusError::ChannelNotFound` - the channel was never created
    pub fn publish(
        &self,
        channel: &str,
        message_type: &str,
        payload: Value,
    ) -> Result<Arc<Message>, BusError> {
        self.publish_draft(channel, Draft::event(message_type, payload))
    }

    /// Publish a prepared draft (requests, responses, bridged messages).
    ///
    /// # Errors
    ///
    /// - `BusError::ChannelNotFound` - the channel was never created
    pub fn publish_draft(&self, channel: &str, draft: Draft) -> Result<Arc<Message>, BusError> {
        let target = self.require(channel)?;
        let message = target.publish(draft);
        debug!(
            channel = %channel,
            sequence = message.sequence,
            message_type = %message.message_type,
            "Message published"
        );
        Ok(message)
    }

    /// Publish a typed message on its own channel.
    ///
    /// # Errors
    ///
    /// - `BusError::ChannelNotFound` - `M::CHANNEL` was never created
    pub fn publish_typed<M: ChannelMessage>(&self, message: &M) -> Result<Arc<Message>, BusError> {
        self.publish_draft(M::CHANNEL, message.to_draft())
    }

    /// Subscribe `handler` to a channel.
    ///
    /// A persistent channel first replays its backlog, oldest first, then
    /// delivers live publishes. The handler runs on its own task.
    ///
    /// # Errors
    ///
    /// - `BusError::ChannelNotFound` - the channel was never created
    pub fn subscribe<H: MessageHandler>(
        &self,
        channel: &str,
        handler: H,
    ) -> Result<Subscription, BusError> {
        let target = self.require(channel)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (id, active) = target.attach(tx);

        spawn_delivery(
            channel.to_string(),
            id,
            Arc::new(handler),
            rx,
            Arc::clone(&active),
            Arc::clone(&self.stats),
        );

        Ok(Subscription::new(
            id,
            channel.to_string(),
            active,
            Arc::downgrade(&target),
        ))
    }

    /// Subscribe and consume messages as a stream.
    ///
    /// # Errors
    ///
    /// - `BusError::ChannelNotFound` - the channel was never created
    pub fn subscribe_stream(&self, channel: &str) -> Result<MessageStream, BusError> {
        let target = self.require(channel)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (id, active) = target.attach(tx);

        let subscription =
            Subscription::new(id, channel.to_string(), active, Arc::downgrade(&target));
        Ok(MessageStream::new(rx, subscription))
    }

    /// Stop delivery to `subscription`. Idempotent.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        subscription.unsubscribe();
    }

    /// Number of active subscribers on a channel.
    ///
    /// # Errors
    ///
    /// - `BusError::ChannelNotFound` - the channel was never created
    pub fn subscriber_count(&self, channel: &str) -> Result<usize, BusError> {
        Ok(self.require(channel)?.subscriber_count())
    }

    /// Snapshot of a channel's backlog, oldest first.
    ///
    /// # Errors
    ///
    /// - `BusError::ChannelNotFound` - the channel was never created
    pub fn backlog(&self, channel: &str) -> Result<Vec<Arc<Message>>, BusError> {
        Ok(self.require(channel)?.backlog())
    }

    /// Delivery counters.
    #[must_use]
    pub fn stats(&self) -> BusStatsSnapshot {
        self.stats.snapshot()
    }

    fn require(&self, channel: &str) -> Result<Arc<Channel>, BusError> {
        self.channel(channel)
            .ok_or_else(|| BusError::not_found(channel))
    }

    fn writer_for(&self, name: &str, options: ChannelOptions) -> Option<BacklogWriter> {
        if !options.is_effectively_persistent() {
            return None;
        }
        self.store
            .as_ref()
            .map(|store| BacklogWriter::spawn(name.to_string(), Arc::clone(store)))
    }

    fn validate_name(name: &str) -> Result<(), BusError> {
        if name.trim().is_empty() {
            return Err(BusError::InvalidChannelName(name.to_string()));
        }
        Ok(())
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
