//! # Cross-Context Flows
//!
//! A content script, a popup and the background, each with its own bus,
//! talking over the in-memory transport.
//!
//! ```text
//! content-script:1 ──insight-content──→ background ──router.responses──→ content-script:1
//!            popup ──insight-ui───────→ background ──insight-results───→ popup, content-script:1
//! ```

#[cfg(test)]
mod tests {
    use crate::support::{collect, eventually, fast_requests, next_message, Extension, TAB, WAIT};
    use ib_runtime::handlers::{default_settings, HISTORY_KEY, SETTINGS_KEY};
    use ib_transport::InMemoryNetwork;
    use serde_json::json;
    use shared_types::messages::{
        ContentMessage, GetSettings, QuickAnalysis, ResultsMessage, UiMessage, RESULTS_CHANNEL,
    };
    use shared_types::{ChannelMessage, ContextId, KeyValueStore};
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_content_script_gets_default_settings() {
        let ext = Extension::start(InMemoryNetwork::new(), fast_requests(3)).await;

        let settings = timeout(
            WAIT,
            ext.content
                .router()
                .request_typed(&ContentMessage::GetSettings(GetSettings { tab_id: 1 })),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(settings, default_settings());
        ext.shutdown().await;
    }

    #[tokio::test]
    async fn test_popup_settings_visible_to_content_script() {
        let ext = Extension::start(InMemoryNetwork::new(), fast_requests(3)).await;

        ext.popup
            .bus()
            .publish_typed(&UiMessage::UpdateSettings {
                settings: json!({"theme": "dark", "analysisLanguage": "en"}),
            })
            .unwrap();

        let store = ext.background_store.clone();
        timeout(WAIT, async {
            while store.get(SETTINGS_KEY).await.unwrap().is_none() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let settings = timeout(
            WAIT,
            ext.content
                .router()
                .request_typed(&ContentMessage::GetSettings(GetSettings { tab_id: 1 })),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(settings["theme"], "dark");
        ext.shutdown().await;
    }

    #[tokio::test]
    async fn test_quick_analysis_answered_and_broadcast() {
        let ext = Extension::start(InMemoryNetwork::new(), fast_requests(3)).await;
        let (_popup_sub, mut popup_results) = collect(ext.popup.bus(), RESULTS_CHANNEL);

        let reply = timeout(
            WAIT,
            ext.content
                .router()
                .request_typed(&ContentMessage::QuickAnalysis(QuickAnalysis {
                    text: "Envelopes are immutable. Contexts share nothing.".into(),
                    analysis_type: "questions".into(),
                    tab_id: 1,
                    position: None,
                })),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(reply["type"], "questions");
        let content = reply["content"].as_str().unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.starts_with("• "));

        let broadcast = next_message(&mut popup_results).await;
        assert_eq!(broadcast.origin, Some(ContextId::Background));
        assert!(matches!(
            ResultsMessage::decode(&broadcast).unwrap(),
            ResultsMessage::AnalysisComplete { .. }
        ));
        assert_eq!(ext.analyzer.calls(), 1);
        ext.shutdown().await;
    }

    #[tokio::test]
    async fn test_clear_history_from_popup() {
        let ext = Extension::start(InMemoryNetwork::new(), fast_requests(3)).await;
        ext.background_store
            .set(HISTORY_KEY, json!([{"title": "old"}]))
            .await
            .unwrap();
        let (_sub, mut tab_results) = collect(ext.content.bus(), RESULTS_CHANNEL);

        ext.popup.bus().publish_typed(&UiMessage::ClearHistory).unwrap();

        let cleared = next_message(&mut tab_results).await;
        assert_eq!(cleared.message_type, "history-cleared");
        assert_eq!(ext.background_store.get(HISTORY_KEY).await.unwrap(), None);
        ext.shutdown().await;
    }

    #[tokio::test]
    async fn test_request_ids_correlate_concurrent_requests() {
        let ext = Extension::start(InMemoryNetwork::new(), fast_requests(3)).await;
        let router = ext.content.router();

        let texts = ["Alpha is first.", "Beta is second.", "Gamma is third.", "Delta is fourth."];
        let handles: Vec<_> = texts
            .iter()
            .map(|text| {
                router.request_typed(&ContentMessage::QuickAnalysis(QuickAnalysis {
                    text: (*text).to_string(),
                    analysis_type: "summary".into(),
                    tab_id: 1,
                    position: None,
                }))
            })
            .collect();

        let replies = timeout(WAIT, futures::future::join_all(handles)).await.unwrap();
        for (text, reply) in texts.iter().zip(replies) {
            assert_eq!(reply.unwrap()["content"], *text);
        }
        assert_eq!(router.pending_count(), 0);
        ext.shutdown().await;
    }

    #[tokio::test]
    async fn test_background_drops_responses_it_did_not_request() {
        let ext = Extension::start(InMemoryNetwork::new(), fast_requests(3)).await;

        timeout(
            WAIT,
            ext.content
                .router()
                .request_typed(&ContentMessage::GetSettings(GetSettings { tab_id: 1 })),
        )
        .await
        .unwrap()
        .unwrap();

        let background = ext.background.router().clone();
        eventually(|| background.stats().responses_dropped >= 1).await;
        assert_eq!(ext.content.router().stats().completed, 1);
        assert_eq!(ext.network.stats().unreachable, 0);
        assert!(ext.network.is_alive(TAB));
        ext.shutdown().await;
    }
}
