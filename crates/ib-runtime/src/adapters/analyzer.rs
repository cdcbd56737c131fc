//! # Analyzer Port
//!
//! The AI completion backend is an external collaborator. The background
//! handlers only see this trait; results are opaque JSON documents that the
//! bus carries without interpreting.
//!
//! [`ExtractiveAnalyzer`] is a local, model-free implementation used by the
//! binary and the tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// How much work the analyzer should put in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    Quick,
    Standard,
}

/// One analysis job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    /// `content`, `summary`, `questions`, `explain`, ...
    pub analysis_type: String,
    pub text: String,
    #[serde(default)]
    pub context: String,
    pub depth: AnalysisDepth,
}

impl AnalysisRequest {
    pub fn quick(analysis_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            analysis_type: analysis_type.into(),
            text: text.into(),
            context: String::new(),
            depth: AnalysisDepth::Quick,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalyzerError {
    /// The backend could not be reached. Worth retrying.
    #[error("Analyzer unavailable: {0}")]
    Unavailable(String),

    /// The backend refused this input.
    #[error("Analysis rejected: {0}")]
    Rejected(String),
}

/// Outbound port to the analysis backend.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<Value, AnalyzerError>;
}

/// Model-free analyzer producing an extractive summary.
///
/// Result shape:
///
/// ```json
/// {
///   "type": "summary",
///   "status": "completed",
///   "output": { "summary": "...", "wordCount": 12 },
///   "sections": [{ "title": "Summary", "content": "..." }, { "title": "Explanation", "content": "..." }],
///   "recommendations": [{ "title": "..." }]
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveAnalyzer;

impl ExtractiveAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Analyzer for ExtractiveAnalyzer {
    async fn analyze(&self, request: AnalysisRequest) -> Result<Value, AnalyzerError> {
        let sentences = split_sentences(&request.text);
        let Some(first) = sentences.first() else {
            return Err(AnalyzerError::Rejected("empty text".to_string()));
        };

        let word_count = request.text.split_whitespace().count();
        let limit = match request.depth {
            AnalysisDepth::Quick => 2,
            AnalysisDepth::Standard => 5,
        };

        let explanation = if request.context.trim().is_empty() {
            format!("{} sentence(s), {word_count} word(s).", sentences.len())
        } else {
            format!(
                "{} sentence(s), {word_count} word(s), read in the context of: {}",
                sentences.len(),
                request.context.trim()
            )
        };

        let recommendations: Vec<Value> = sentences
            .iter()
            .take(limit)
            .map(|s| json!({ "title": format!("What supports the claim \"{s}\"?") }))
            .collect();

        Ok(json!({
            "type": request.analysis_type,
            "status": "completed",
            "output": { "summary": first, "wordCount": word_count },
            "sections": [
                { "title": "Summary", "content": first },
                { "title": "Explanation", "content": explanation },
            ],
            "recommendations": recommendations,
        }))
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .map(str::to_string)
        .collect()
}
