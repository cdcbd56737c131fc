//! # Message Handlers
//!
//! Subscribers that give the standard channels their meaning.

pub mod background;
pub mod settings;

pub use background::{
    format_quick_result, BackgroundError, BackgroundService, ContentEvents, ContentRequests,
    UiEvents,
};
pub use settings::{default_settings, HISTORY_KEY, MAX_HISTORY, SETTINGS_KEY};
