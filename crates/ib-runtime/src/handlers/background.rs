//! # Background Handlers
//!
//! The background context owns settings, history and analysis. Content
//! scripts and UI documents reach it only through the bus.
//!
//! ## Message Flow
//!
//! ```text
//! content script ──insight-content──→ ContentEvents   ──→ Analyzer
//!                   (requests)       ContentRequests ──→ router.responses
//! UI document    ──insight-ui───────→ UiEvents        ──→ store
//!                                           │
//!                                           └──insight-results──→ UI documents
//! ```
//!
//! Request-tagged messages on `insight-content` are answered by
//! [`ContentRequests`] through the router; [`ContentEvents`] skips them so a
//! request never runs twice.

use super::settings::{default_settings, HISTORY_KEY, MAX_HISTORY, SETTINGS_KEY};
use crate::adapters::analyzer::{AnalysisDepth, AnalysisRequest, Analyzer, AnalyzerError};
use async_trait::async_trait;
use ib_router::RequestHandler;
use serde_json::{json, Value};
use shared_bus::{BusError, HandlerError, MessageBus, MessageHandler};
use shared_types::messages::{AnalyzeParagraph, ContentMessage, QuickAnalysis, ResultsMessage, UiMessage};
use shared_types::{current_timestamp_ms, ChannelMessage, KeyValueStore, Message, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackgroundError {
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Publishing result failed: {0}")]
    Bus(#[from] BusError),
}

impl From<BackgroundError> for HandlerError {
    fn from(err: BackgroundError) -> Self {
        HandlerError::new(err.to_string())
    }
}

/// Settings, history and analysis for the background context.
pub struct BackgroundService {
    bus: Arc<MessageBus>,
    store: Arc<dyn KeyValueStore>,
    analyzer: Arc<dyn Analyzer>,
    // Serializes read-modify-write of the history list.
    history: Mutex<()>,
}

impl BackgroundService {
    pub fn new(
        bus: Arc<MessageBus>,
        store: Arc<dyn KeyValueStore>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            bus,
            store,
            analyzer,
            history: Mutex::new(()),
        }
    }

    /// Stored settings, or the defaults if none were saved.
    pub async fn settings(&self) -> Result<Value, BackgroundError> {
        Ok(self
            .store
            .get(SETTINGS_KEY)
            .await?
            .unwrap_or_else(default_settings))
    }

    pub async fn update_settings(&self, settings: Value) -> Result<(), BackgroundError> {
        self.store.set(SETTINGS_KEY, settings).await?;
        info!("Settings updated");
        Ok(())
    }

    /// Drop the history and tell the UI.
    pub async fn clear_history(&self) -> Result<(), BackgroundError> {
        {
            let _history = self.history.lock().await;
            self.store.remove(HISTORY_KEY).await?;
        }
        self.bus.publish_typed(&ResultsMessage::HistoryCleared)?;
        info!("History cleared");
        Ok(())
    }

    /// Analyze a paragraph picked by the content script and publish the result.
    #[instrument(skip(self, paragraph), fields(tab_id = paragraph.tab_id))]
    pub async fn analyze_paragraph(&self, paragraph: &AnalyzeParagraph) -> Result<Value, BackgroundError> {
        let request = AnalysisRequest::quick("content", paragraph.text.as_str())
            .with_context(paragraph.context.as_str());
        let result = self.analyzer.analyze(request.clone()).await?;

        self.record_history(&request, &result).await?;
        self.bus.publish_typed(&ResultsMessage::AnalysisComplete {
            result: result.clone(),
            context: json!({
                "action": "analyze-paragraph",
                "tabId": paragraph.tab_id,
                "elementId": paragraph.element_id,
            }),
        })?;
        Ok(result)
    }

    /// Run a tooltip analysis and return `{type, content}`.
    #[instrument(skip(self, quick), fields(tab_id = quick.tab_id, analysis_type = %quick.analysis_type))]
    pub async fn quick_analysis(&self, quick: &QuickAnalysis) -> Result<Value, BackgroundError> {
        let request = AnalysisRequest {
            analysis_type: quick.analysis_type.clone(),
            text: quick.text.clone(),
            context: String::new(),
            depth: AnalysisDepth::Quick,
        };
        let result = self.analyzer.analyze(request.clone()).await?;

        self.record_history(&request, &result).await?;
        self.bus.publish_typed(&ResultsMessage::AnalysisComplete {
            result: result.clone(),
            context: json!({
                "action": "quick-analysis",
                "tabId": quick.tab_id,
                "position": quick.position,
            }),
        })?;

        Ok(json!({
            "type": quick.analysis_type,
            "content": format_quick_result(&result, &quick.analysis_type),
        }))
    }

    async fn record_history(&self, request: &AnalysisRequest, result: &Value) -> Result<(), BackgroundError> {
        let _history = self.history.lock().await;

        let mut entries = match self.store.get(HISTORY_KEY).await? {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        };
        entries.push(json!({
            "analysisType": request.analysis_type,
            "title": request.text.chars().take(50).collect::<String>(),
            "summary": result.pointer("/output/summary").cloned().unwrap_or(Value::Null),
            "timestamp": current_timestamp_ms(),
        }));
        if entries.len() > MAX_HISTORY {
            let excess = entries.len() - MAX_HISTORY;
            entries.drain(..excess);
        }

        self.store.set(HISTORY_KEY, Value::Array(entries)).await?;
        Ok(())
    }
}

/// Tooltip text for an analysis result.
pub fn format_quick_result(result: &Value, analysis_type: &str) -> String {
    match analysis_type {
        "summary" => result
            .pointer("/output/summary")
            .and_then(Value::as_str)
            .or_else(|| result.pointer("/sections/0/content").and_then(Value::as_str))
            .unwrap_or("Unable to summarize")
            .to_string(),
        "questions" => result
            .get("recommendations")
            .and_then(Value::as_array)
            .map(|recs| {
                recs.iter()
                    .take(2)
                    .filter_map(|r| r.get("title").and_then(Value::as_str))
                    .map(|title| format!("• {title}"))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default(),
        "explain" => result
            .get("sections")
            .and_then(Value::as_array)
            .and_then(|sections| {
                sections.iter().find(|s| {
                    s.get("title")
                        .and_then(Value::as_str)
                        .is_some_and(|t| t.contains("Explanation"))
                })
            })
            .and_then(|s| s.get("content").and_then(Value::as_str))
            .unwrap_or("No explanation found")
            .to_string(),
        _ => match result.get("output") {
            Some(Value::String(output)) => output.clone(),
            Some(Value::Null) | None => "Analysis complete".to_string(),
            Some(other) => other.to_string(),
        },
    }
}

/// `insight-content` events from content scripts.
pub struct ContentEvents {
    service: Arc<BackgroundService>,
}

impl ContentEvents {
    pub fn new(service: Arc<BackgroundService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for ContentEvents {
    async fn handle(&self, message: Arc<Message>) -> Result<(), HandlerError> {
        if message.is_request() || message.is_response {
            return Ok(());
        }

        match ContentMessage::decode(&message)? {
            ContentMessage::AnalyzeParagraph(paragraph) => {
                self.service.analyze_paragraph(&paragraph).await?;
            }
            ContentMessage::QuickAnalysis(quick) => {
                self.service.quick_analysis(&quick).await?;
            }
            ContentMessage::GetSettings(get) => {
                debug!(tab_id = get.tab_id, "get-settings without request id, nothing to answer");
            }
        }
        Ok(())
    }
}

/// Request side of `insight-content`, served through the router.
pub struct ContentRequests {
    service: Arc<BackgroundService>,
}

impl ContentRequests {
    pub fn new(service: Arc<BackgroundService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl RequestHandler for ContentRequests {
    async fn handle(&self, request: Arc<Message>) -> Result<Value, HandlerError> {
        let reply = match ContentMessage::decode(&request)? {
            ContentMessage::AnalyzeParagraph(paragraph) => {
                self.service.analyze_paragraph(&paragraph).await?
            }
            ContentMessage::QuickAnalysis(quick) => self.service.quick_analysis(&quick).await?,
            ContentMessage::GetSettings(_) => self.service.settings().await?,
        };
        Ok(reply)
    }
}

/// `insight-ui` messages from the popup, side panel and options page.
pub struct UiEvents {
    service: Arc<BackgroundService>,
}

impl UiEvents {
    pub fn new(service: Arc<BackgroundService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for UiEvents {
    async fn handle(&self, message: Arc<Message>) -> Result<(), HandlerError> {
        match UiMessage::decode(&message)? {
            UiMessage::UpdateSettings { settings } => self.service.update_settings(settings).await?,
            UiMessage::ClearHistory => self.service.clear_history().await?,
            UiMessage::ExportResults { format, results } => {
                let count = results.as_array().map_or(0, Vec::len);
                info!(format = %format, results = count, "Export requested, nothing to do");
            }
        }
        Ok(())
    }
}
