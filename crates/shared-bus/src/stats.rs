//! Bus-wide delivery counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every channel of one bus.
#[derive(Debug, Default)]
pub struct BusStats {
    /// Messages stamped and fanned out.
    pub published: AtomicU64,
    /// Handler invocations that returned `Ok`.
    pub delivered: AtomicU64,
    /// Handler invocations that returned an error or panicked.
    pub handler_failures: AtomicU64,
    /// Backlog entries evicted because the backlog was full.
    pub evicted: AtomicU64,
    /// Queued messages discarded because their subscription became inactive.
    pub discarded: AtomicU64,
}

impl BusStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> BusStatsSnapshot {
        BusStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`BusStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStatsSnapshot {
    pub published: u64,
    pub delivered: u64,
    pub handler_failures: u64,
    pub evicted: u64,
    pub discarded: u64,
}
