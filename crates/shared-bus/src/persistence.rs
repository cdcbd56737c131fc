//! # Backlog Persistence
//!
//! Write-behind copy of persistent backlogs in the durable store, so a
//! background context that the host platform killed can restore its channels
//! on restart.
//!
//! Each channel gets one writer task. Publishes hand it full snapshots; the
//! task coalesces snapshots that queue up while a write is in flight and
//! always writes the newest one, so store writes stay ordered.

use crate::BACKLOG_KEY_PREFIX;
use shared_types::{KeyValueStore, Message, StoreError};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Store key holding the backlog of `channel`.
#[must_use]
pub fn backlog_key(channel: &str) -> String {
    format!("{BACKLOG_KEY_PREFIX}{channel}")
}

/// Handle to a channel's writer task.
#[derive(Debug, Clone)]
pub(crate) struct BacklogWriter {
    tx: mpsc::UnboundedSender<Vec<Arc<Message>>>,
}

impl BacklogWriter {
    /// Spawn the writer task for `channel`.
    pub(crate) fn spawn(channel: String, store: Arc<dyn KeyValueStore>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Arc<Message>>>();
        let key = backlog_key(&channel);

        tokio::spawn(async move {
            while let Some(mut snapshot) = rx.recv().await {
                while let Ok(newer) = rx.try_recv() {
                    snapshot = newer;
                }

                let entries: Vec<&Message> = snapshot.iter().map(Arc::as_ref).collect();
                let value = match serde_json::to_value(&entries) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "Backlog snapshot not serializable");
                        continue;
                    }
                };

                match store.set(&key, value).await {
                    Ok(()) => debug!(channel = %channel, len = snapshot.len(), "Backlog persisted"),
                    Err(e) => warn!(channel = %channel, error = %e, "Backlog persist failed"),
                }
            }
        });

        Self { tx }
    }

    /// Queue a snapshot for writing. Never blocks.
    pub(crate) fn write(&self, snapshot: Vec<Arc<Message>>) {
        // The task only stops once every sender is gone.
        let _ = self.tx.send(snapshot);
    }
}

/// Read the persisted backlog of `channel`, oldest first.
pub(crate) async fn load_backlog(
    store: &dyn KeyValueStore,
    channel: &str,
) -> Result<Vec<Message>, StoreError> {
    let Some(value) = store.get(&backlog_key(channel)).await? else {
        return Ok(Vec::new());
    };

    let mut messages: Vec<Message> =
        serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    messages.retain(|m| m.channel == channel);
    messages.sort_by_key(|m| m.sequence);
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_types::{Draft, InMemoryStore};
    use std::time::Duration;

    #[tokio::test]
    async fn test_writer_persists_latest_snapshot() {
        let store = Arc::new(InMemoryStore::new());
        let writer = BacklogWriter::spawn("insight-results".into(), store.clone());

        let first = Arc::new(Message::stamp("insight-results", 1, Draft::event("a", json!(1))));
        let second = Arc::new(Message::stamp("insight-results", 2, Draft::event("b", json!(2))));
        writer.write(vec![first.clone()]);
        writer.write(vec![first, second]);

        let mut loaded = Vec::new();
        for _ in 0..50 {
            loaded = load_backlog(store.as_ref(), "insight-results").await.unwrap();
            if loaded.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let seqs: Vec<u64> = loaded.iter().map(|m| m.sequence).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_load_missing_backlog_is_empty() {
        let store = InMemoryStore::new();
        assert!(load_backlog(&store, "nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_corrupt_backlog_fails() {
        let store = InMemoryStore::new();
        store.set(&backlog_key("c"), json!("garbage")).await.unwrap();

        assert!(matches!(
            load_backlog(&store, "c").await,
            Err(StoreError::Serialization(_))
        ));
    }
}
