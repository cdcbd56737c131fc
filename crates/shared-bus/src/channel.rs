//! # Message Channel
//!
//! A named, independently ordered stream of messages.
//!
//! ## Invariants
//!
//! | Invariant | Enforcement |
//! |-----------|-------------|
//! | Sequence strictly increasing per channel | `publish()` assigns under the state lock |
//! | Non-persistent channels never store | `backlog` is `None` unless effectively persistent |
//! | Late subscribers get backlog before live publishes | `attach()` replays and registers under the same lock |
//!
//! A channel created with `persistent = true` but `max_backlog = 0` is
//! persistent in name only: nothing is stored and nothing is replayed.

use crate::persistence::BacklogWriter;
use crate::queue::MessageQueue;
use crate::stats::BusStats;
use crate::subscriber::{SubscriberSlot, SubscriptionId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shared_types::{Draft, Message};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Options fixed at channel creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelOptions {
    /// Keep a backlog for late subscribers.
    pub persistent: bool,
    /// Backlog capacity. Zero disables persistence.
    pub max_backlog: usize,
}

impl ChannelOptions {
    /// Non-persistent channel: live delivery only.
    #[must_use]
    pub fn transient() -> Self {
        Self::default()
    }

    /// Persistent channel keeping the last `max_backlog` messages.
    #[must_use]
    pub fn persistent(max_backlog: usize) -> Self {
        Self {
            persistent: true,
            max_backlog,
        }
    }

    /// Whether the channel actually stores and replays messages.
    #[must_use]
    pub fn is_effectively_persistent(&self) -> bool {
        self.persistent && self.max_backlog > 0
    }
}

struct ChannelState {
    next_sequence: u64,
    backlog: Option<MessageQueue>,
    subscribers: HashMap<SubscriptionId, SubscriberSlot>,
}

/// A named ordering and fan-out unit.
pub struct Channel {
    name: String,
    options: ChannelOptions,
    state: Mutex<ChannelState>,
    next_subscription: AtomicU64,
    stats: Arc<BusStats>,
    writer: Option<BacklogWriter>,
}

impl Channel {
    pub(crate) fn new(
        name: String,
        options: ChannelOptions,
        stats: Arc<BusStats>,
        writer: Option<BacklogWriter>,
    ) -> Self {
        Self::with_backlog(name, options, stats, writer, Vec::new())
    }

    /// Create a channel whose backlog starts with `restored` (oldest first).
    /// Sequence numbering continues after the newest restored message.
    pub(crate) fn with_backlog(
        name: String,
        options: ChannelOptions,
        stats: Arc<BusStats>,
        writer: Option<BacklogWriter>,
        restored: Vec<Message>,
    ) -> Self {
        if options.persistent && options.max_backlog == 0 {
            debug!(channel = %name, "Channel is persistent in name only (max_backlog = 0)");
        }

        let next_sequence = restored.last().map_or(1, |m| m.sequence + 1);
        let backlog = options.is_effectively_persistent().then(|| {
            let mut queue = MessageQueue::new(options.max_backlog);
            for message in restored {
                queue.push(Arc::new(message));
            }
            queue
        });

        Self {
            name,
            options,
            state: Mutex::new(ChannelState {
                next_sequence,
                backlog,
                subscribers: HashMap::new(),
            }),
            next_subscription: AtomicU64::new(1),
            stats,
            writer: writer.filter(|_| options.is_effectively_persistent()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn options(&self) -> ChannelOptions {
        self.options
    }

    #[must_use]
    pub fn is_effectively_persistent(&self) -> bool {
        self.options.is_effectively_persistent()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    /// Copy of the backlog, oldest first. Empty for non-persistent channels.
    #[must_use]
    pub fn backlog(&self) -> Vec<Arc<Message>> {
        self.state
            .lock()
            .backlog
            .as_ref()
            .map(MessageQueue::snapshot)
            .unwrap_or_default()
    }

    /// Sequence number the next publish will receive.
    #[must_use]
    pub fn next_sequence(&self) -> u64 {
        self.state.lock().next_sequence
    }

    /// Stamp `draft`, store it if persistent, and enqueue it for every
    /// active subscriber.
    pub(crate) fn publish(&self, draft: Draft) -> Arc<Message> {
        let mut state = self.state.lock();

        let sequence = state.next_sequence;
        state.next_sequence += 1;
        let message = Arc::new(Message::stamp(&self.name, sequence, draft));

        if let Some(backlog) = state.backlog.as_mut() {
            if let Some(evicted) = backlog.push(Arc::clone(&message)) {
                BusStats::incr(&self.stats.evicted);
                debug!(
                    channel = %self.name,
                    evicted_sequence = evicted.sequence,
                    "Backlog full, evicted oldest message"
                );
            }
            if let Some(writer) = &self.writer {
                writer.write(backlog.snapshot());
            }
        }

        // A failed send means the delivery task is gone; drop the slot.
        state.subscribers.retain(|id, slot| {
            let alive = slot.sender.send(Arc::clone(&message)).is_ok();
            if !alive {
                slot.active.store(false, Ordering::Release);
                debug!(channel = %self.name, subscription = *id, "Pruned dead subscriber");
            }
            alive
        });

        BusStats::incr(&self.stats.published);
        message
    }

    /// Register a new subscriber queue, replaying the backlog into it first.
    pub(crate) fn attach(
        &self,
        sender: mpsc::UnboundedSender<Arc<Message>>,
    ) -> (SubscriptionId, Arc<AtomicBool>) {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        let mut state = self.state.lock();
        let mut replayed = 0usize;
        if let Some(backlog) = state.backlog.as_ref() {
            for message in backlog.iter() {
                if sender.send(Arc::clone(message)).is_err() {
                    break;
                }
                replayed += 1;
            }
        }
        state.subscribers.insert(
            id,
            SubscriberSlot {
                sender,
                active: Arc::clone(&active),
            },
        );
        drop(state);

        debug!(channel = %self.name, subscription = id, replayed, "Subscriber attached");
        (id, active)
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub(crate) fn detach(&self, id: SubscriptionId) -> bool {
        self.state.lock().subscribers.remove(&id).is_some()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish()
    }
}
