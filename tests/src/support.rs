//! Fixtures shared by the integration scenarios.
//!
//! [`Extension`] is one extension instance in a single process: a background
//! context, a content script for tab 1 and a popup, each with its own bus,
//! bridged over one [`InMemoryNetwork`].

use async_trait::async_trait;
use ib_runtime::adapters::{AnalysisRequest, Analyzer, AnalyzerError, ExtractiveAnalyzer};
use ib_runtime::container::config::RequestSettings;
use ib_runtime::{ExtensionContext, RuntimeConfig};
use ib_transport::InMemoryNetwork;
use serde_json::Value;
use shared_bus::{handler_fn, MessageBus, Subscription};
use shared_types::{ContextId, InMemoryStore, KeyValueStore, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const TAB: ContextId = ContextId::ContentScript { tab_id: 1 };

/// Generous bound for anything a test awaits.
pub const WAIT: Duration = Duration::from_secs(10);

/// Analyzer that counts calls.
#[derive(Default)]
pub struct CountingAnalyzer {
    calls: AtomicU64,
}

impl CountingAnalyzer {
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Analyzer for CountingAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<Value, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ExtractiveAnalyzer.analyze(request).await
    }
}

/// Request settings with short timeouts for real-time tests.
pub fn fast_requests(attempts: u32) -> RequestSettings {
    RequestSettings {
        timeout: Duration::from_millis(200),
        max_retries: attempts,
        retry_delay: Duration::from_millis(20),
        backoff: false,
    }
}

pub struct Extension {
    pub network: Arc<InMemoryNetwork>,
    pub background_store: Arc<InMemoryStore>,
    pub analyzer: Arc<CountingAnalyzer>,
    pub background: ExtensionContext,
    pub content: ExtensionContext,
    pub popup: ExtensionContext,
}

impl Extension {
    /// Build and bridge the three contexts.
    pub async fn start(network: Arc<InMemoryNetwork>, requests: RequestSettings) -> Self {
        let background_store = Arc::new(InMemoryStore::new());
        let analyzer = Arc::new(CountingAnalyzer::default());

        let mut background = context(ContextId::Background, &requests, background_store.clone()).await;
        background.install_background(analyzer.clone()).unwrap();
        background
            .attach_transport(
                Arc::new(network.endpoint(ContextId::Background)),
                vec![TAB, ContextId::Popup],
            )
            .unwrap();

        let mut content = context(TAB, &requests, Arc::new(InMemoryStore::new())).await;
        content
            .attach_transport(Arc::new(network.endpoint(TAB)), vec![ContextId::Background])
            .unwrap();

        let mut popup = context(ContextId::Popup, &requests, Arc::new(InMemoryStore::new())).await;
        popup
            .attach_transport(
                Arc::new(network.endpoint(ContextId::Popup)),
                vec![ContextId::Background],
            )
            .unwrap();

        Self {
            network,
            background_store,
            analyzer,
            background,
            content,
            popup,
        }
    }

    pub async fn shutdown(self) {
        self.content.shutdown().await;
        self.popup.shutdown().await;
        self.background.shutdown().await;
    }
}

async fn context(
    id: ContextId,
    requests: &RequestSettings,
    store: Arc<dyn KeyValueStore>,
) -> ExtensionContext {
    let mut config = RuntimeConfig::for_context(id);
    config.requests = requests.clone();
    config.liveness.period = None;
    ExtensionContext::build(config, store).await.unwrap()
}

/// Forward every message on `channel` into a receiver.
pub fn collect(bus: &MessageBus, channel: &str) -> (Subscription, mpsc::UnboundedReceiver<Arc<Message>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = bus
        .subscribe(
            channel,
            handler_fn(move |message: Arc<Message>| {
                let _ = tx.send(message);
                async { Ok(()) }
            }),
        )
        .unwrap();
    (subscription, rx)
}

/// Next collected message, failing the test after [`WAIT`].
pub async fn next_message(rx: &mut mpsc::UnboundedReceiver<Arc<Message>>) -> Arc<Message> {
    tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap()
}

/// Poll `condition` until it holds, failing the test after [`WAIT`].
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}
