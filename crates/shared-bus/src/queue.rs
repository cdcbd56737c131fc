//! # Backlog Queue
//!
//! Bounded FIFO of the most recent messages of a persistent channel.
//! Inserting into a full queue evicts the oldest entry, so the queue always
//! holds exactly the last `capacity` publishes.

use shared_types::Message;
use std::collections::VecDeque;
use std::sync::Arc;

/// Bounded FIFO backlog.
#[derive(Debug, Clone)]
pub struct MessageQueue {
    entries: VecDeque<Arc<Message>>,
    capacity: usize,
}

impl MessageQueue {
    /// Create an empty queue holding at most `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a message, returning the evicted oldest entry if the queue was full.
    ///
    /// A zero-capacity queue stores nothing and hands the message straight back.
    pub fn push(&mut self, message: Arc<Message>) -> Option<Arc<Message>> {
        if self.capacity == 0 {
            return Some(message);
        }
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(message);
        evicted
    }

    /// Copy of the current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<Message>> {
        self.entries.iter().cloned().collect()
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Message>> {
        self.entries.iter()
    }

    /// Sequence number of the newest entry.
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.entries.back().map(|m| m.sequence)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
