//! # Typed Channel Messages
//!
//! Each well-known channel has a closed vocabulary of message types. Handlers
//! decode a [`Message`] into the channel's union once, at the boundary, and
//! then match exhaustively instead of poking at untyped payload fields.
//!
//! | Channel | Types |
//! |---------|-------|
//! | `insight-content` | `analyze-paragraph`, `quick-analysis`, `get-settings` |
//! | `insight-ui` | `update-settings`, `clear-history`, `export-results` |
//! | `insight-results` | `analysis-complete`, `history-cleared` |

use crate::envelope::{Draft, Message};
use crate::errors::MessageDecodeError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content scripts -> background.
pub const CONTENT_CHANNEL: &str = "insight-content";
/// Background -> UI documents.
pub const RESULTS_CHANNEL: &str = "insight-results";
/// UI documents -> background.
pub const UI_CHANNEL: &str = "insight-ui";

/// A tagged union describing every message type of one channel.
pub trait ChannelMessage: Sized {
    /// The channel this vocabulary belongs to.
    const CHANNEL: &'static str;

    /// The wire `type` tag of this value.
    fn message_type(&self) -> &'static str;

    /// The wire payload of this value.
    fn payload(&self) -> Value;

    /// Validate and decode a message published on [`Self::CHANNEL`].
    fn decode(message: &Message) -> Result<Self, MessageDecodeError>;

    /// Draft ready for publishing.
    fn to_draft(&self) -> Draft {
        Draft::event(self.message_type(), self.payload())
    }
}

/// Payload of `analyze-paragraph`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeParagraph {
    pub text: String,
    #[serde(default)]
    pub context: String,
    pub tab_id: u32,
    pub element_id: String,
}

/// Payload of `quick-analysis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuickAnalysis {
    pub text: String,
    pub analysis_type: String,
    pub tab_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Value>,
}

/// Payload of `get-settings`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSettings {
    pub tab_id: u32,
}

/// Messages on `insight-content`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentMessage {
    AnalyzeParagraph(AnalyzeParagraph),
    QuickAnalysis(QuickAnalysis),
    GetSettings(GetSettings),
}

impl ChannelMessage for ContentMessage {
    const CHANNEL: &'static str = CONTENT_CHANNEL;

    fn message_type(&self) -> &'static str {
        match self {
            ContentMessage::AnalyzeParagraph(_) => "analyze-paragraph",
            ContentMessage::QuickAnalysis(_) => "quick-analysis",
            ContentMessage::GetSettings(_) => "get-settings",
        }
    }

    fn payload(&self) -> Value {
        match self {
            ContentMessage::AnalyzeParagraph(p) => to_payload(p),
            ContentMessage::QuickAnalysis(p) => to_payload(p),
            ContentMessage::GetSettings(p) => to_payload(p),
        }
    }

    fn decode(message: &Message) -> Result<Self, MessageDecodeError> {
        check_channel::<Self>(message)?;
        match message.message_type.as_str() {
            "analyze-paragraph" => from_payload(message).map(ContentMessage::AnalyzeParagraph),
            "quick-analysis" => from_payload(message).map(ContentMessage::QuickAnalysis),
            "get-settings" => from_payload(message).map(ContentMessage::GetSettings),
            _ => Err(unknown_type::<Self>(message)),
        }
    }
}

/// Messages on `insight-ui`.
#[derive(Debug, Clone, PartialEq)]
pub enum UiMessage {
    UpdateSettings { settings: Value },
    ClearHistory,
    ExportResults { format: String, results: Value },
}

#[derive(Serialize, Deserialize)]
struct UpdateSettingsPayload {
    settings: Value,
}

#[derive(Serialize, Deserialize)]
struct ExportResultsPayload {
    format: String,
    #[serde(default)]
    results: Value,
}

impl ChannelMessage for UiMessage {
    const CHANNEL: &'static str = UI_CHANNEL;

    fn message_type(&self) -> &'static str {
        match self {
            UiMessage::UpdateSettings { .. } => "update-settings",
            UiMessage::ClearHistory => "clear-history",
            UiMessage::ExportResults { .. } => "export-results",
        }
    }

    fn payload(&self) -> Value {
        match self {
            UiMessage::UpdateSettings { settings } => serde_json::json!({ "settings": settings }),
            UiMessage::ClearHistory => serde_json::json!({}),
            UiMessage::ExportResults { format, results } => {
                serde_json::json!({ "format": format, "results": results })
            }
        }
    }

    fn decode(message: &Message) -> Result<Self, MessageDecodeError> {
        check_channel::<Self>(message)?;
        match message.message_type.as_str() {
            "update-settings" => from_payload::<UpdateSettingsPayload>(message)
                .map(|p| UiMessage::UpdateSettings { settings: p.settings }),
            "clear-history" => Ok(UiMessage::ClearHistory),
            "export-results" => from_payload::<ExportResultsPayload>(message).map(|p| {
                UiMessage::ExportResults {
                    format: p.format,
                    results: p.results,
                }
            }),
            _ => Err(unknown_type::<Self>(message)),
        }
    }
}

/// Messages on `insight-results`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResultsMessage {
    AnalysisComplete { result: Value, context: Value },
    HistoryCleared,
}

#[derive(Serialize, Deserialize)]
struct AnalysisCompletePayload {
    result: Value,
    #[serde(default)]
    context: Value,
}

impl ChannelMessage for ResultsMessage {
    const CHANNEL: &'static str = RESULTS_CHANNEL;

    fn message_type(&self) -> &'static str {
        match self {
            ResultsMessage::AnalysisComplete { .. } => "analysis-complete",
            ResultsMessage::HistoryCleared => "history-cleared",
        }
    }

    fn payload(&self) -> Value {
        match self {
            ResultsMessage::AnalysisComplete { result, context } => {
                serde_json::json!({ "result": result, "context": context })
            }
            ResultsMessage::HistoryCleared => serde_json::json!({}),
        }
    }

    fn decode(message: &Message) -> Result<Self, MessageDecodeError> {
        check_channel::<Self>(message)?;
        match message.message_type.as_str() {
            "analysis-complete" => from_payload::<AnalysisCompletePayload>(message).map(|p| {
                ResultsMessage::AnalysisComplete {
                    result: p.result,
                    context: p.context,
                }
            }),
            "history-cleared" => Ok(ResultsMessage::HistoryCleared),
            _ => Err(unknown_type::<Self>(message)),
        }
    }
}

// Payload structs are plain data with string keys; serialization cannot fail.
fn to_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn from_payload<T: DeserializeOwned>(message: &Message) -> Result<T, MessageDecodeError> {
    serde_json::from_value(message.payload.clone()).map_err(|e| {
        MessageDecodeError::InvalidPayload {
            message_type: message.message_type.clone(),
            reason: e.to_string(),
        }
    })
}

fn check_channel<M: ChannelMessage>(message: &Message) -> Result<(), MessageDecodeError> {
    if message.channel != M::CHANNEL {
        return Err(MessageDecodeError::WrongChannel {
            expected: M::CHANNEL,
            actual: message.channel.clone(),
        });
    }
    Ok(())
}

fn unknown_type<M: ChannelMessage>(message: &Message) -> MessageDecodeError {
    MessageDecodeError::UnknownType {
        channel: M::CHANNEL,
        message_type: message.message_type.clone(),
    }
}
