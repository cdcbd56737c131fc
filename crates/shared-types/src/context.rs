//! Execution context identifiers.
//!
//! A context is an isolated environment with its own event loop and memory:
//! the background worker, one content script per tab, and the UI documents.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a context id string cannot be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown context id: {0}")]
pub struct ParseContextError(pub String);

/// Identity of one execution context of the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ContextId {
    /// The long-lived background worker.
    Background,
    /// The content script injected into one browser tab.
    ContentScript { tab_id: u32 },
    /// The toolbar popup document.
    Popup,
    /// The side panel document.
    SidePanel,
    /// The options page.
    Options,
    /// The welcome page opened on install.
    Welcome,
}

impl ContextId {
    /// Whether the host platform may suspend this context at any time.
    #[must_use]
    pub fn is_suspendable(&self) -> bool {
        matches!(self, ContextId::Background)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextId::Background => write!(f, "background"),
            ContextId::ContentScript { tab_id } => write!(f, "content-script:{tab_id}"),
            ContextId::Popup => write!(f, "popup"),
            ContextId::SidePanel => write!(f, "side-panel"),
            ContextId::Options => write!(f, "options"),
            ContextId::Welcome => write!(f, "welcome"),
        }
    }
}

impl FromStr for ContextId {
    type Err = ParseContextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "background" => Ok(ContextId::Background),
            "popup" => Ok(ContextId::Popup),
            "side-panel" => Ok(ContextId::SidePanel),
            "options" => Ok(ContextId::Options),
            "welcome" => Ok(ContextId::Welcome),
            other => other
                .strip_prefix("content-script:")
                .and_then(|tab| tab.parse().ok())
                .map(|tab_id| ContextId::ContentScript { tab_id })
                .ok_or_else(|| ParseContextError(other.to_string())),
        }
    }
}

impl TryFrom<String> for ContextId {
    type Error = ParseContextError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ContextId> for String {
    fn from(id: ContextId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_parse_round_trip() {
        for id in [
            ContextId::Background,
            ContextId::ContentScript { tab_id: 42 },
            ContextId::Popup,
            ContextId::SidePanel,
            ContextId::Options,
            ContextId::Welcome,
        ] {
            assert_eq!(id.to_string().parse::<ContextId>().unwrap(), id);
        }
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("devtools".parse::<ContextId>().is_err());
        assert!("content-script:abc".parse::<ContextId>().is_err());
    }

    #[test]
    fn test_serde_uses_display_form() {
        let json = serde_json::to_string(&ContextId::ContentScript { tab_id: 7 }).unwrap();
        assert_eq!(json, "\"content-script:7\"");
    }

    #[test]
    fn test_only_background_is_suspendable() {
        assert!(ContextId::Background.is_suspendable());
        assert!(!ContextId::Popup.is_suspendable());
    }
}
