//! Pending Request Store - requests awaiting their response.
//!
//! Maps request ids to the task waiting on a response. The response listener
//! feeds replies in; the request driver consumes them.
//!
//! Flow:
//! 1. `request()` calls `register()` and gets a reply receiver
//! 2. The driver publishes the request and waits on the receiver
//! 3. The response listener calls `complete()` for every response message
//! 4. A success reply removes the entry; later duplicates find nothing and
//!    are dropped

use crate::error::RequestError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use shared_types::RequestId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

/// A reply as seen by the requester: the response payload or the responder's
/// failure reason.
pub(crate) type Reply = Result<Value, String>;

/// A request waiting for its response.
struct PendingRequest {
    sender: mpsc::UnboundedSender<Reply>,
    created_at: Instant,
    request_type: String,
    attempt: u32,
    deadline: Instant,
}

/// Counters for the pending request store.
#[derive(Debug, Default)]
pub struct PendingStats {
    pub registered: AtomicU64,
    pub completed: AtomicU64,
    pub remote_errors: AtomicU64,
    pub timeouts: AtomicU64,
    pub cancelled: AtomicU64,
    /// Responses with no matching pending request.
    pub responses_dropped: AtomicU64,
}

/// Point-in-time copy of [`PendingStats`] plus the current pending count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterStats {
    pub registered: u64,
    pub completed: u64,
    pub remote_errors: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub responses_dropped: u64,
    pub pending: usize,
}

/// At most one entry per request id.
#[derive(Default)]
pub struct PendingRequestStore {
    pending: DashMap<RequestId, PendingRequest>,
    stats: PendingStats,
}

impl PendingRequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and get the receiver its replies arrive on.
    ///
    /// # Errors
    ///
    /// `RequestError::DuplicateRequest` if the id is already pending.
    pub(crate) fn register(
        &self,
        request_id: RequestId,
        request_type: &str,
    ) -> Result<mpsc::UnboundedReceiver<Reply>, RequestError> {
        match self.pending.entry(request_id) {
            Entry::Occupied(_) => Err(RequestError::DuplicateRequest { request_id }),
            Entry::Vacant(vacant) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let now = Instant::now();
                vacant.insert(PendingRequest {
                    sender: tx,
                    created_at: now,
                    request_type: request_type.to_string(),
                    attempt: 0,
                    deadline: now,
                });
                self.stats.registered.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request_id = %request_id,
                    request_type,
                    "Registered pending request"
                );
                Ok(rx)
            }
        }
    }

    /// Record the start of an attempt. Returns false if the request is gone.
    pub(crate) fn begin_attempt(&self, request_id: &RequestId, attempt: u32, timeout: Duration) -> bool {
        match self.pending.get_mut(request_id) {
            Some(mut entry) => {
                entry.attempt = attempt;
                entry.deadline = Instant::now() + timeout;
                true
            }
            None => false,
        }
    }

    /// Hand a reply to the waiting request.
    ///
    /// A success reply removes the entry; a failure reply leaves it in place
    /// for the next attempt. Returns false when no request is waiting, in
    /// which case the reply is dropped.
    pub(crate) fn complete(&self, request_id: RequestId, reply: Reply) -> bool {
        if reply.is_err() {
            let Some(entry) = self.pending.get(&request_id) else {
                return self.drop_reply(request_id);
            };
            self.stats.remote_errors.fetch_add(1, Ordering::Relaxed);
            debug!(
                request_id = %request_id,
                request_type = %entry.request_type,
                attempt = entry.attempt,
                "Responder reported failure"
            );
            return entry.sender.send(reply).is_ok();
        }

        let Some((_, pending)) = self.pending.remove(&request_id) else {
            return self.drop_reply(request_id);
        };

        let response_time = pending.created_at.elapsed();
        match pending.sender.send(reply) {
            Ok(()) => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    request_id = %request_id,
                    request_type = pending.request_type,
                    attempt = pending.attempt,
                    response_time_ms = response_time.as_millis() as u64,
                    "Completed pending request"
                );
                true
            }
            Err(_) => {
                // Driver already gone
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    fn drop_reply(&self, request_id: RequestId) -> bool {
        self.stats.responses_dropped.fetch_add(1, Ordering::Relaxed);
        debug!(
            request_id = %request_id,
            "Dropping response for unknown or finished request"
        );
        false
    }

    pub(crate) fn record_timeout(&self, request_id: &RequestId) {
        self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
        debug!(request_id = %request_id, "Attempt timed out");
    }

    /// Cancel a pending request. Its driver observes the closed reply channel.
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        if self.pending.remove(request_id).is_some() {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(request_id = %request_id, "Cancelled pending request");
            true
        } else {
            false
        }
    }

    /// Remove a finished request without counting it as cancelled.
    pub(crate) fn remove(&self, request_id: &RequestId) {
        self.pending.remove(request_id);
    }

    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.pending.contains_key(request_id)
    }

    /// Current attempt number of a pending request (0 before the first).
    pub fn attempt(&self, request_id: &RequestId) -> Option<u32> {
        self.pending.get(request_id).map(|entry| entry.attempt)
    }

    /// When the current attempt of a pending request times out.
    pub fn deadline(&self, request_id: &RequestId) -> Option<Instant> {
        self.pending.get(request_id).map(|entry| entry.deadline)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            registered: self.stats.registered.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            remote_errors: self.stats.remote_errors.load(Ordering::Relaxed),
            timeouts: self.stats.timeouts.load(Ordering::Relaxed),
            cancelled: self.stats.cancelled.load(Ordering::Relaxed),
            responses_dropped: self.stats.responses_dropped.load(Ordering::Relaxed),
            pending: self.pending.len(),
        }
    }
}

/// Removes a request's entry when its driver finishes, however it finishes.
pub(crate) struct PendingGuard {
    pub(crate) store: std::sync::Arc<PendingRequestStore>,
    pub(crate) request_id: RequestId,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.store.remove(&self.request_id);
    }
}
