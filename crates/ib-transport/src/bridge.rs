//! # Bus Bridge
//!
//! Connects a local [`MessageBus`] to peer contexts over a [`Transport`].
//!
//! ```text
//!  local publish ──→ channel ──→ bridge subscriber ──encode──→ transport ──→ peers
//!  peer envelope ──→ transport ──decode──→ publish(origin = peer) ──→ channel
//! ```
//!
//! Messages carry their `origin`. Only locally originated messages are
//! forwarded, so an injected message never bounces back to where it came
//! from. The receiving bus stamps its own sequence numbers, which keeps
//! per-channel ordering local to each bus while the transport preserves
//! arrival order.

use crate::transport::{ReceiveHandler, Transport};
use async_trait::async_trait;
use shared_bus::{BusError, HandlerError, MessageBus, MessageHandler, Subscription};
use shared_types::{ContextId, EnvelopeCodec, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("Bridge attach failed: {0}")]
    Bus(#[from] BusError),
}

#[derive(Debug, Default)]
struct Counters {
    forwarded: AtomicU64,
    received: AtomicU64,
    send_failures: AtomicU64,
    decode_failures: AtomicU64,
    unknown_channel: AtomicU64,
}

/// Point-in-time bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Envelopes handed to the transport (one per peer).
    pub forwarded: u64,
    /// Envelopes injected into the local bus.
    pub received: u64,
    pub send_failures: u64,
    pub decode_failures: u64,
    /// Inbound envelopes for channels this bus does not have.
    pub unknown_channel: u64,
}

/// Bridges a set of channels between the local bus and peer contexts.
///
/// Dropping the bridge stops forwarding and removes its inbound handler, so
/// the transport no longer holds the bus.
pub struct BusBridge {
    local: ContextId,
    transport: Arc<dyn Transport>,
    inbound: ReceiveHandler,
    _subscriptions: Vec<Subscription>,
    counters: Arc<Counters>,
}

impl BusBridge {
    /// Forward `channels` to `peers` and inject envelopes received from any
    /// peer. Every channel must already exist on the local bus.
    ///
    /// # Errors
    ///
    /// `BridgeError::Bus` if a channel is missing.
    pub fn attach(
        bus: Arc<MessageBus>,
        transport: Arc<dyn Transport>,
        peers: Vec<ContextId>,
        channels: &[&str],
    ) -> Result<Self, BridgeError> {
        let local = transport.local();
        let counters = Arc::new(Counters::default());
        let codec = EnvelopeCodec::new();
        let peers = Arc::new(peers);

        let mut subscriptions = Vec::with_capacity(channels.len());
        for channel in channels {
            let subscription = bus.subscribe(
                channel,
                Forwarder {
                    transport: Arc::clone(&transport),
                    peers: Arc::clone(&peers),
                    codec,
                    counters: Arc::clone(&counters),
                },
            )?;
            subscriptions.push(subscription);
        }

        let inbound = inbound_handler(bus, codec, Arc::clone(&counters));
        transport.on_receive(Arc::clone(&inbound));

        info!(
            context = %local,
            peers = peers.len(),
            channels = channels.len(),
            "Bus bridge attached"
        );

        Ok(Self {
            local,
            transport,
            inbound,
            _subscriptions: subscriptions,
            counters,
        })
    }

    pub fn local(&self) -> ContextId {
        self.local
    }

    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            forwarded: self.counters.forwarded.load(Ordering::Relaxed),
            received: self.counters.received.load(Ordering::Relaxed),
            send_failures: self.counters.send_failures.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
            unknown_channel: self.counters.unknown_channel.load(Ordering::Relaxed),
        }
    }
}

impl Drop for BusBridge {
    fn drop(&mut self) {
        self.transport.clear_receive(&self.inbound);
        debug!(context = %self.local, "Bus bridge detached");
    }
}

struct Forwarder {
    transport: Arc<dyn Transport>,
    peers: Arc<Vec<ContextId>>,
    codec: EnvelopeCodec,
    counters: Arc<Counters>,
}

#[async_trait]
impl MessageHandler for Forwarder {
    async fn handle(&self, message: Arc<Message>) -> Result<(), HandlerError> {
        if message.origin.is_some() {
            return Ok(());
        }

        let bytes = self
            .codec
            .encode(&message)
            .map_err(|e| HandlerError::new(e.to_string()))?;

        for peer in self.peers.iter() {
            match self.transport.send(peer, bytes.clone()).await {
                Ok(()) => {
                    self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    // The router sees this as a missing response and retries
                    self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        channel = %message.channel,
                        sequence = message.sequence,
                        %peer,
                        error = %e,
                        "Forward failed"
                    );
                }
            }
        }
        Ok(())
    }
}

fn inbound_handler(bus: Arc<MessageBus>, codec: EnvelopeCodec, counters: Arc<Counters>) -> ReceiveHandler {
    Arc::new(move |from: ContextId, bytes: Vec<u8>| {
        let message = match codec.decode(&bytes) {
            Ok(message) => message,
            Err(e) => {
                counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%from, error = %e, "Discarding malformed envelope");
                return;
            }
        };

        match bus.publish_draft(&message.channel, message.to_draft().with_origin(from)) {
            Ok(_) => {
                counters.received.fetch_add(1, Ordering::Relaxed);
            }
            Err(BusError::ChannelNotFound { channel }) => {
                counters.unknown_channel.fetch_add(1, Ordering::Relaxed);
                debug!(%from, %channel, "Envelope for unknown channel");
            }
            Err(e) => {
                warn!(%from, error = %e, "Failed to inject envelope");
            }
        }
    })
}
