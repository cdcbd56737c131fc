//! In-process transport connecting context endpoints.
//!
//! Each endpoint owns an inbox drained by a pump task that hands bytes to the
//! installed receive handler in arrival order. The network can mark a context
//! suspended (sends to it fail as unreachable) and can drop a fraction of
//! envelopes to exercise retry paths.

use crate::transport::{ReceiveHandler, Transport, TransportError};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared_types::ContextId;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

type Envelope = (ContextId, Vec<u8>);

struct EndpointState {
    inbox: mpsc::UnboundedSender<Envelope>,
    alive: AtomicBool,
    handler: RwLock<Option<ReceiveHandler>>,
}

struct Loss {
    drop_rate: f64,
    rng: StdRng,
}

/// Counters for the in-memory network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    pub sent: u64,
    pub dropped: u64,
    pub unreachable: u64,
}

/// A set of connected in-process endpoints.
pub struct InMemoryNetwork {
    endpoints: DashMap<ContextId, Arc<EndpointState>>,
    loss: Mutex<Loss>,
    sent: AtomicU64,
    dropped: AtomicU64,
    unreachable: AtomicU64,
}

impl InMemoryNetwork {
    /// A loss-free network.
    pub fn new() -> Arc<Self> {
        Self::with_drop_rate(0.0, 0)
    }

    /// A network that silently drops `drop_rate` (0.0..=1.0) of envelopes,
    /// driven by a seeded generator so runs are reproducible.
    pub fn with_drop_rate(drop_rate: f64, seed: u64) -> Arc<Self> {
        Arc::new(Self {
            endpoints: DashMap::new(),
            loss: Mutex::new(Loss {
                drop_rate: drop_rate.clamp(0.0, 1.0),
                rng: StdRng::seed_from_u64(seed),
            }),
            sent: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            unreachable: AtomicU64::new(0),
        })
    }

    /// Create the endpoint for `context`, replacing any previous one.
    ///
    /// Must be called inside a tokio runtime.
    pub fn endpoint(self: &Arc<Self>, context: ContextId) -> MemoryEndpoint {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        let state = Arc::new(EndpointState {
            inbox: tx,
            alive: AtomicBool::new(true),
            handler: RwLock::new(None),
        });

        let pump_state = Arc::downgrade(&state);
        tokio::spawn(async move {
            while let Some((from, bytes)) = rx.recv().await {
                let Some(state) = pump_state.upgrade() else {
                    break;
                };
                let handler = state.handler.read().clone();
                match handler {
                    Some(handler) => handler(from, bytes),
                    None => debug!(%context, %from, "No receive handler, dropping envelope"),
                }
            }
            trace!(%context, "Endpoint pump stopped");
        });

        self.endpoints.insert(context, Arc::clone(&state));
        debug!(%context, "Endpoint registered");

        MemoryEndpoint {
            local: context,
            network: Arc::clone(self),
            state,
        }
    }

    /// Suspend or resume a context. A suspended context is unreachable.
    pub fn set_alive(&self, context: ContextId, alive: bool) {
        if let Some(state) = self.endpoints.get(&context) {
            state.alive.store(alive, Ordering::SeqCst);
            debug!(%context, alive, "Context liveness changed");
        }
    }

    pub fn is_alive(&self, context: ContextId) -> bool {
        self.endpoints
            .get(&context)
            .is_some_and(|state| state.alive.load(Ordering::SeqCst))
    }

    /// Change the drop rate.
    pub fn set_drop_rate(&self, drop_rate: f64) {
        self.loss.lock().drop_rate = drop_rate.clamp(0.0, 1.0);
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            sent: self.sent.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            unreachable: self.unreachable.load(Ordering::Relaxed),
        }
    }

    fn deliver(&self, from: ContextId, target: ContextId, bytes: Vec<u8>) -> Result<(), TransportError> {
        let Some(state) = self
            .endpoints
            .get(&target)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|state| state.alive.load(Ordering::SeqCst))
        else {
            self.unreachable.fetch_add(1, Ordering::Relaxed);
            return Err(TransportError::Unreachable(target));
        };

        let lost = {
            let mut loss = self.loss.lock();
            let rate = loss.drop_rate;
            rate > 0.0 && loss.rng.gen_bool(rate)
        };
        if lost {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            trace!(%from, %target, "Envelope lost");
            return Ok(());
        }

        state
            .inbox
            .send((from, bytes))
            .map_err(|_| TransportError::Unreachable(target))?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// One context's view of an [`InMemoryNetwork`].
pub struct MemoryEndpoint {
    local: ContextId,
    network: Arc<InMemoryNetwork>,
    state: Arc<EndpointState>,
}

impl MemoryEndpoint {
    pub fn network(&self) -> &Arc<InMemoryNetwork> {
        &self.network
    }
}

#[async_trait]
impl Transport for MemoryEndpoint {
    fn local(&self) -> ContextId {
        self.local
    }

    async fn send(&self, target: &ContextId, bytes: Vec<u8>) -> Result<(), TransportError> {
        if !self.state.alive.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.network.deliver(self.local, *target, bytes)
    }

    fn on_receive(&self, handler: ReceiveHandler) {
        *self.state.handler.write() = Some(handler);
    }

    fn clear_receive(&self, handler: &ReceiveHandler) {
        let mut installed = self.state.handler.write();
        if installed.as_ref().is_some_and(|current| Arc::ptr_eq(current, handler)) {
            *installed = None;
            debug!(context = %self.local, "Receive handler removed");
        }
    }
}
