//! # Liveness Keeper
//!
//! The host may suspend an idle background context. Touching the durable
//! store on a fixed period counts as activity and keeps it running.
//!
//! The keeper task is owned by its [`KeeperHandle`]: `stop()` shuts it down
//! and waits for it, dropping the handle aborts it.

#![cfg_attr(test, allow(clippy::unwrap_used))]

use shared_types::KeyValueStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default period between store accesses.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(20);

/// Default key read on every tick.
pub const DEFAULT_KEY: &str = "keep-alive";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LivenessError {
    #[error("Liveness period must be greater than zero")]
    ZeroPeriod,
}

/// Keeper settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessConfig {
    pub period: Duration,
    pub key: String,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            key: DEFAULT_KEY.to_string(),
        }
    }
}

impl LivenessConfig {
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Self::default()
        }
    }
}

/// Starts keepers.
pub struct LivenessKeeper;

impl LivenessKeeper {
    /// Spawn the keeper. The first access happens immediately.
    ///
    /// # Errors
    ///
    /// `LivenessError::ZeroPeriod` for a zero period.
    pub fn start(
        store: Arc<dyn KeyValueStore>,
        config: LivenessConfig,
    ) -> Result<KeeperHandle, LivenessError> {
        if config.period.is_zero() {
            return Err(LivenessError::ZeroPeriod);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accesses = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(run(store, config.clone(), Arc::clone(&accesses), shutdown_rx));

        info!(
            period_secs = config.period.as_secs_f64(),
            key = %config.key,
            "Liveness keeper started"
        );

        Ok(KeeperHandle {
            task: Some(task),
            shutdown_tx,
            accesses,
        })
    }
}

async fn run(
    store: Arc<dyn KeyValueStore>,
    config: LivenessConfig,
    accesses: Arc<AtomicU64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let count = accesses.fetch_add(1, Ordering::Relaxed) + 1;
                match store.get(&config.key).await {
                    Ok(_) => debug!(count, "Keep-alive store access"),
                    Err(e) => warn!(error = %e, "Keep-alive store access failed"),
                }
            }
        }
    }

    debug!("Liveness keeper stopped");
}

/// Owner of a running keeper.
#[must_use = "dropping a KeeperHandle stops the keeper"]
pub struct KeeperHandle {
    task: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    accesses: Arc<AtomicU64>,
}

impl KeeperHandle {
    /// Store accesses performed so far.
    pub fn accesses(&self) -> u64 {
        self.accesses.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the keeper and wait for its task to exit.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Liveness keeper task failed");
            }
        }
        info!(accesses = self.accesses(), "Liveness keeper shut down");
    }
}

impl Drop for KeeperHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
