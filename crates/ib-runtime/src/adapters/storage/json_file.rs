//! # JSON File Store
//!
//! File-backed implementation of the `KeyValueStore` port.
//!
//! The whole key space is one JSON object. It is loaded once at open and
//! rewritten on every mutation: written to a sibling `.tmp` file first and
//! renamed over the original, so a crash mid-write leaves the previous
//! snapshot intact.

use async_trait::async_trait;
use serde_json::{Map, Value};
use shared_types::{KeyValueStore, StoreError};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// JSON file store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFileConfig {
    /// Path of the state file.
    pub path: PathBuf,
    /// fsync the temporary file before renaming it into place.
    pub sync_writes: bool,
}

impl JsonFileConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync_writes: true,
        }
    }

    /// Config for testing (no fsync).
    pub fn for_testing(path: impl Into<PathBuf>) -> Self {
        Self {
            sync_writes: false,
            ..Self::new(path)
        }
    }
}

/// Key-value store persisted as a single JSON document.
pub struct JsonFileStore {
    config: JsonFileConfig,
    // Held across the file write so snapshots land in mutation order.
    entries: Mutex<Map<String, Value>>,
}

impl JsonFileStore {
    /// Open the store, creating the parent directory if needed.
    ///
    /// A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// - `StoreError::Io` - the file or its directory could not be accessed
    /// - `StoreError::Serialization` - the file is not a JSON object
    pub async fn open(config: JsonFileConfig) -> Result<Self, StoreError> {
        if let Some(parent) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_error)?;
        }

        let entries = match fs::read(&config.path).await {
            Ok(bytes) if bytes.is_empty() => Map::new(),
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => map,
                Ok(other) => {
                    return Err(StoreError::Serialization(format!(
                        "expected a JSON object in {}, found {}",
                        config.path.display(),
                        json_kind(&other)
                    )))
                }
                Err(e) => return Err(StoreError::Serialization(e.to_string())),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(io_error(e)),
        };

        info!(
            path = %config.path.display(),
            keys = entries.len(),
            "JSON file store opened"
        );

        Ok(Self {
            config,
            entries: Mutex::new(entries),
        })
    }

    /// Open with default settings.
    ///
    /// # Errors
    ///
    /// See [`open`](Self::open).
    pub async fn open_default(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open(JsonFileConfig::new(path.as_ref())).await
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn persist(&self, entries: &Map<String, Value>) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let tmp = self.config.path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).await.map_err(io_error)?;
        file.write_all(&bytes).await.map_err(io_error)?;
        if self.config.sync_writes {
            file.sync_all().await.map_err(io_error)?;
        }
        drop(file);
        fs::rename(&tmp, &self.config.path).await.map_err(io_error)?;

        debug!(
            path = %self.config.path.display(),
            bytes = bytes.len(),
            "State file written"
        );
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value);
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&entries).await
    }
}

fn io_error(e: std::io::Error) -> StoreError {
    StoreError::Io(e.to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
