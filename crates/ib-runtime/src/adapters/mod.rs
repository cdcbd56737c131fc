//! # Port Adapters
//!
//! Implementations of the outbound ports the runtime depends on: durable
//! storage and the analysis backend.

pub mod analyzer;
pub mod storage;

pub use analyzer::{AnalysisDepth, AnalysisRequest, Analyzer, AnalyzerError, ExtractiveAnalyzer};
pub use storage::{JsonFileConfig, JsonFileStore};
