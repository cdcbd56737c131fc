//! Stored keys and the settings document the background falls back to.

use serde_json::{json, Value};

/// Key of the user's settings document.
pub const SETTINGS_KEY: &str = "insight-settings";

/// Key of the analysis history list.
pub const HISTORY_KEY: &str = "insight-history";

/// Most recent history entries kept.
pub const MAX_HISTORY: usize = 100;

/// Settings returned when the user never saved any.
pub fn default_settings() -> Value {
    json!({
        "enableFloatingIcons": true,
        "enableAutoAnalysis": false,
        "aiModel": "gpt",
        "analysisLanguage": "vi",
        "theme": "light",
        "showConfidenceScores": true,
        "floatingIconPosition": "top-right",
        "keyboardShortcuts": {
            "analyzeSelection": "Ctrl+Shift+A",
            "toggleSidebar": "Ctrl+Shift+S",
            "quickQuestions": "Ctrl+Shift+Q"
        }
    })
}
