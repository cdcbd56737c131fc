//! # Resilience
//!
//! Requests over a lossy transport, a background that is suspended and comes
//! back, and a background that restarts from its stored backlogs.

#[cfg(test)]
mod tests {
    use crate::support::{
        collect, eventually, fast_requests, next_message, CountingAnalyzer, Extension, TAB, WAIT,
    };
    use ib_runtime::handlers::HISTORY_KEY;
    use ib_router::RequestError;
    use ib_runtime::adapters::ExtractiveAnalyzer;
    use ib_runtime::{ExtensionContext, RuntimeConfig};
    use ib_transport::InMemoryNetwork;
    use serde_json::json;
    use shared_types::messages::{
        AnalyzeParagraph, ContentMessage, GetSettings, QuickAnalysis, UiMessage, CONTENT_CHANNEL,
        RESULTS_CHANNEL, UI_CHANNEL,
    };
    use shared_types::{ContextId, InMemoryStore, KeyValueStore};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn quick(text: String) -> ContentMessage {
        ContentMessage::QuickAnalysis(QuickAnalysis {
            text,
            analysis_type: "summary".into(),
            tab_id: 1,
            position: None,
        })
    }

    #[tokio::test]
    async fn test_requests_survive_lossy_transport() {
        let network = InMemoryNetwork::with_drop_rate(0.2, 7);
        let ext = Extension::start(network, fast_requests(10)).await;
        let router = ext.content.router();

        let handles: Vec<_> = (0..20)
            .map(|i| router.request_typed(&quick(format!("Sentence number {i}. Trailing words."))))
            .collect();
        let replies = timeout(Duration::from_secs(30), futures::future::join_all(handles))
            .await
            .unwrap();

        for (i, reply) in replies.into_iter().enumerate() {
            assert_eq!(reply.unwrap()["content"], format!("Sentence number {i}."));
        }
        assert!(ext.network.stats().dropped > 0);
        // Retries that reached the background after its first answer are
        // served from the dedup cache, not re-analyzed.
        assert_eq!(ext.analyzer.calls(), 20);
        ext.shutdown().await;
    }

    #[tokio::test]
    async fn test_suspended_background_recovers() {
        let ext = Extension::start(InMemoryNetwork::new(), fast_requests(20)).await;
        ext.network.set_alive(ContextId::Background, false);

        let handle = ext
            .content
            .router()
            .request_typed(&ContentMessage::GetSettings(GetSettings { tab_id: 1 }));
        let request_id = handle.request_id();

        let router = Arc::clone(ext.content.router());
        eventually(|| router.stats().timeouts >= 2).await;
        assert!(router.is_pending(&request_id));

        ext.network.set_alive(ContextId::Background, true);
        let settings = timeout(WAIT, handle).await.unwrap().unwrap();
        assert_eq!(settings["theme"], "light");
        assert!(ext.network.stats().unreachable >= 2);
        ext.shutdown().await;
    }

    #[tokio::test]
    async fn test_dead_background_exhausts_retries() {
        let ext = Extension::start(InMemoryNetwork::new(), fast_requests(3)).await;
        ext.network.set_alive(ContextId::Background, false);

        let err = timeout(
            WAIT,
            ext.content
                .router()
                .request_typed(&ContentMessage::GetSettings(GetSettings { tab_id: 1 })),
        )
        .await
        .unwrap()
        .unwrap_err();

        match err {
            RequestError::MaxRetriesExceeded { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(source.is_timeout());
            }
            other => panic!("expected MaxRetriesExceeded, got {other:?}"),
        }
        assert_eq!(ext.content.router().pending_count(), 0);
        ext.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancelled_request_ignores_late_response() {
        let ext = Extension::start(InMemoryNetwork::new(), fast_requests(20)).await;
        ext.network.set_alive(ContextId::Background, false);

        let router = Arc::clone(ext.content.router());
        let handle = router.request_typed(&ContentMessage::GetSettings(GetSettings { tab_id: 1 }));
        eventually(|| router.stats().timeouts >= 1).await;

        handle.cancel();
        let outcome = timeout(WAIT, handle).await.unwrap();
        assert_eq!(outcome, Err(RequestError::Cancelled));
        assert_eq!(router.pending_count(), 0);

        ext.network.set_alive(ContextId::Background, true);
        assert!(ext.network.is_alive(TAB));
        ext.shutdown().await;
    }

    #[tokio::test]
    async fn test_restarted_background_restores_backlog() {
        let store = Arc::new(InMemoryStore::new());
        let mut config = RuntimeConfig::default();
        config.liveness.period = None;
        config.channels.backlog_capacity = 3;

        let first = ExtensionContext::build(config.clone(), store.clone()).await.unwrap();
        for n in 0..5 {
            first
                .bus()
                .publish(RESULTS_CHANNEL, "analysis-complete", json!({"result": n, "context": {}}))
                .unwrap();
        }
        let backlog_key = shared_bus::backlog_key(RESULTS_CHANNEL);
        let probe = store.clone();
        timeout(WAIT, async {
            loop {
                let stored = probe.get(&backlog_key).await.unwrap();
                let last_sequence = stored
                    .as_ref()
                    .and_then(|v| v.as_array())
                    .and_then(|a| a.last())
                    .and_then(|last| last["sequence"].as_u64());
                if last_sequence == Some(5) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        first.shutdown().await;

        let mut second = ExtensionContext::build(config, store.clone()).await.unwrap();
        second.install_background(Arc::new(ExtractiveAnalyzer)).unwrap();

        let restored: Vec<u64> = second
            .bus()
            .backlog(RESULTS_CHANNEL)
            .unwrap()
            .iter()
            .map(|m| m.sequence)
            .collect();
        assert_eq!(restored, vec![3, 4, 5]);

        let next = second
            .bus()
            .publish(UI_CHANNEL, "clear-history", json!({}))
            .unwrap();
        assert_eq!(next.sequence, 1);
        second.shutdown().await;
    }

    #[tokio::test]
    async fn test_restarted_background_does_not_replay_commands() {
        let store = Arc::new(InMemoryStore::new());
        let mut config = RuntimeConfig::default();
        config.liveness.period = None;

        let mut first = ExtensionContext::build(config.clone(), store.clone()).await.unwrap();
        let first_analyzer = Arc::new(CountingAnalyzer::default());
        first.install_background(first_analyzer.clone()).unwrap();
        let (_results, mut results) = collect(first.bus(), RESULTS_CHANNEL);

        first.bus().publish_typed(&UiMessage::ClearHistory).unwrap();
        assert_eq!(next_message(&mut results).await.message_type, "history-cleared");
        first
            .bus()
            .publish_typed(&ContentMessage::AnalyzeParagraph(AnalyzeParagraph {
                text: "Only the background talks to the analyzer.".into(),
                context: String::new(),
                tab_id: 1,
                element_id: "p-1".into(),
            }))
            .unwrap();
        assert_eq!(next_message(&mut results).await.message_type, "analysis-complete");
        assert_eq!(first_analyzer.calls(), 1);
        first.shutdown().await;

        let mut second = ExtensionContext::build(config, store.clone()).await.unwrap();
        let second_analyzer = Arc::new(CountingAnalyzer::default());
        second.install_background(second_analyzer.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(second_analyzer.calls(), 0);
        assert!(second.bus().backlog(CONTENT_CHANNEL).unwrap().is_empty());
        assert!(second.bus().backlog(UI_CHANNEL).unwrap().is_empty());
        let history = store.get(HISTORY_KEY).await.unwrap().unwrap();
        assert_eq!(history.as_array().unwrap().len(), 1);
        second.shutdown().await;
    }
}
