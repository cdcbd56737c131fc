//! # Context Configuration
//!
//! Unified configuration for one execution context: which context this is,
//! how requests are retried, how large backlogs are and where state lives.
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `IB_CONTEXT` | `background` | Context id (`content-script:<tab>` for tabs) |
//! | `IB_KEEPALIVE_SECS` | `20` | Liveness period, `0` disables the keeper |
//! | `IB_REQUEST_TIMEOUT_MS` | `5000` | Per-attempt request timeout |
//! | `IB_MAX_RETRIES` | `3` | Total request attempts |
//! | `IB_RETRY_DELAY_MS` | `1000` | Base delay between attempts |
//! | `IB_RETRY_BACKOFF` | `true` | Double the delay after every attempt |
//! | `IB_BACKLOG_CAPACITY` | `100` | Backlog size of the standard channels |
//! | `IB_STATE_PATH` | unset | JSON state file; unset keeps state in memory |

use ib_retry::{RetryPolicy, DEFAULT_DELAY, DEFAULT_MAX_RETRIES};
use ib_router::{RequestPolicy, DEFAULT_REQUEST_TIMEOUT};
use ib_telemetry::parse_flag;
use shared_types::{ContextId, ParseContextError};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default liveness period.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(20);

/// Default backlog size of the standard channels.
pub const DEFAULT_BACKLOG_CAPACITY: usize = 100;

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable did not parse.
    #[error("Invalid value for {var}: `{value}`")]
    InvalidValue { var: &'static str, value: String },

    #[error("Invalid context: {0}")]
    Context(#[from] ParseContextError),

    #[error("Request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("At least one request attempt is required")]
    ZeroAttempts,
}

/// Complete context configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Which context this process plays.
    pub context: ContextId,
    pub liveness: LivenessSettings,
    pub requests: RequestSettings,
    pub channels: ChannelSettings,
    pub storage: StorageSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            context: ContextId::Background,
            liveness: LivenessSettings::default(),
            requests: RequestSettings::default(),
            channels: ChannelSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

/// Liveness keeper settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LivenessSettings {
    /// Period between store accesses. `None` disables the keeper.
    pub period: Option<Duration>,
}

impl Default for LivenessSettings {
    fn default() -> Self {
        Self {
            period: Some(DEFAULT_KEEPALIVE),
        }
    }
}

/// Request/response settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSettings {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Total attempts, including the first.
    pub max_retries: u32,
    /// Base delay between attempts.
    pub retry_delay: Duration,
    /// Exponential backoff.
    pub backoff: bool,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_DELAY,
            backoff: true,
        }
    }
}

/// Standard channel settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Backlog size of every standard channel. Zero keeps no backlog.
    pub backlog_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            backlog_capacity: DEFAULT_BACKLOG_CAPACITY,
        }
    }
}

/// Durable state settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageSettings {
    /// JSON file backing the key-value store. `None` keeps state in memory.
    pub state_path: Option<PathBuf>,
}

impl RuntimeConfig {
    /// Defaults for the given context.
    pub fn for_context(context: ContextId) -> Self {
        Self {
            context,
            ..Self::default()
        }
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// `ConfigError` if a variable is set to something unparsable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable source.
    ///
    /// # Errors
    ///
    /// `ConfigError` if a variable is set to something unparsable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(context) = lookup("IB_CONTEXT") {
            config.context = context.trim().parse()?;
        }

        if let Some(secs) = parse_var::<u64>(&lookup, "IB_KEEPALIVE_SECS")? {
            config.liveness.period = (secs > 0).then(|| Duration::from_secs(secs));
        }

        if let Some(ms) = parse_var::<u64>(&lookup, "IB_REQUEST_TIMEOUT_MS")? {
            config.requests.timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<u32>(&lookup, "IB_MAX_RETRIES")? {
            config.requests.max_retries = n;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "IB_RETRY_DELAY_MS")? {
            config.requests.retry_delay = Duration::from_millis(ms);
        }
        if let Some(flag) = lookup("IB_RETRY_BACKOFF") {
            config.requests.backoff = parse_flag(&flag);
        }

        if let Some(capacity) = parse_var::<usize>(&lookup, "IB_BACKLOG_CAPACITY")? {
            config.channels.backlog_capacity = capacity;
        }

        config.storage.state_path = lookup("IB_STATE_PATH")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    /// Reject settings the runtime cannot work with.
    ///
    /// # Errors
    ///
    /// - `ConfigError::ZeroTimeout` - requests would time out immediately
    /// - `ConfigError::ZeroAttempts` - requests would never be sent
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requests.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.requests.max_retries == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(())
    }

    /// Router policy built from the request settings.
    pub fn request_policy(&self) -> RequestPolicy {
        let retry = RetryPolicy::default()
            .with_max_retries(self.requests.max_retries)
            .with_delay(self.requests.retry_delay)
            .with_backoff(self.requests.backoff);
        RequestPolicy::default()
            .with_timeout(self.requests.timeout)
            .with_retry(retry)
    }

    /// Whether a liveness keeper should run in this context.
    pub fn keeper_enabled(&self) -> bool {
        self.liveness.period.is_some() && self.context.is_suspendable()
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}
