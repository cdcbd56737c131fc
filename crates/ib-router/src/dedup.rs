//! # Time-Bounded Request Cache
//!
//! Receiver-side deduplication for retried requests.
//!
//! A retry re-publishes a request with the same `RequestId`. The serving side
//! records every id it has admitted:
//!
//! - first sighting: the handler runs
//! - sighting while the handler is still running: ignored
//! - sighting after the handler succeeded: answered from the cached result
//! - sighting after the handler failed: the handler runs again
//!
//! Entries expire after the validity window and are garbage-collected lazily
//! on admission, which bounds memory.

use crate::pending::Reply;
use parking_lot::Mutex;
use shared_types::RequestId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Default validity window. Longer than the default request deadline.
pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_secs(60);

/// Default garbage collection interval.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(10);

/// What to do with an incoming request.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// Never seen: run the handler.
    Fresh,
    /// The handler is still running for this id.
    InFlight,
    /// Already handled: re-send the cached reply.
    Completed(Reply),
}

#[derive(Debug)]
enum EntryState {
    InFlight,
    Completed(Reply),
}

#[derive(Debug)]
struct CacheEntry {
    state: EntryState,
    touched: Instant,
}

struct Inner {
    entries: HashMap<RequestId, CacheEntry>,
    last_gc: Instant,
}

/// Time-bounded record of admitted request ids and their results.
pub struct RequestDedupCache {
    inner: Mutex<Inner>,
    ttl: Duration,
    gc_interval: Duration,
}

impl Default for RequestDedupCache {
    fn default() -> Self {
        Self::with_config(DEFAULT_DEDUP_TTL, DEFAULT_GC_INTERVAL)
    }
}

impl RequestDedupCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_config(ttl: Duration, gc_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                last_gc: Instant::now(),
            }),
            ttl,
            gc_interval,
        }
    }

    /// Check and record `request_id` atomically.
    pub fn admit(&self, request_id: RequestId) -> Admission {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        if now.duration_since(inner.last_gc) > self.gc_interval {
            let ttl = self.ttl;
            inner
                .entries
                .retain(|_, entry| now.duration_since(entry.touched) <= ttl);
            inner.last_gc = now;
        }

        if let Some(entry) = inner.entries.get(&request_id) {
            if now.duration_since(entry.touched) <= self.ttl {
                return match &entry.state {
                    EntryState::InFlight => Admission::InFlight,
                    EntryState::Completed(reply) => Admission::Completed(reply.clone()),
                };
            }
        }

        inner.entries.insert(
            request_id,
            CacheEntry {
                state: EntryState::InFlight,
                touched: now,
            },
        );
        Admission::Fresh
    }

    /// Store the result of a finished request. Failures are forgotten.
    pub fn finish(&self, request_id: RequestId, reply: Reply) {
        let mut inner = self.inner.lock();
        if reply.is_err() {
            inner.entries.remove(&request_id);
            return;
        }
        inner.entries.insert(
            request_id,
            CacheEntry {
                state: EntryState::Completed(reply),
                touched: Instant::now(),
            },
        );
    }

    #[must_use]
    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.inner.lock().entries.contains_key(request_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}
