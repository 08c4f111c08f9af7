//! Read-only settings lookup
//!
//! The host owns configuration; this crate only reads it through [`SettingsStore`].
//! [`JsonSettings`] is the file-backed store used by the binary and tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::repository::OperationKind;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings must be a JSON object")]
    NotAnObject,
    #[error("invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read-only key → value lookup supplied by the host
pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
}

/// Settings held in a JSON object
///
/// Keys may be flat (`"git.autoStash": true`) or nested
/// (`"git": { "autoStash": true }`). A flat key wins when both exist.
#[derive(Debug, Clone, Default)]
pub struct JsonSettings {
    values: Map<String, Value>,
}

impl JsonSettings {
    pub fn from_value(value: Value) -> Result<Self, SettingsError> {
        match value {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(SettingsError::NotAnObject),
        }
    }

    /// Load from a file; a missing file yields empty settings
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(SettingsError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let value: Value = serde_json::from_str(&content)?;
        Self::from_value(value)
    }

    /// `<config dir>/git-interop/settings.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("git-interop").join("settings.json"))
    }
}

impl SettingsStore for JsonSettings {
    fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }

        let mut parts = key.split('.');
        let mut current = self.values.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current.clone())
    }
}

/// Typed view of the settings the repository layer consults
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub auto_stash: bool,
    pub fetch_on_pull: bool,
    pub pull_tags: bool,
    pub follow_tags_when_sync: bool,
    pub prune_on_fetch: bool,
    pub autorefresh: bool,
    pub status_limit: usize,
    pub timeout: Duration,
    /// Limit for fetch, pull and push; `None` lets a transfer run until it ends
    pub network_timeout: Option<Duration>,
    /// Candidate git executables tried before `PATH`
    pub git_path_hints: Vec<PathBuf>,
    pub serialized_operations: Vec<OperationKind>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_stash: false,
            fetch_on_pull: false,
            pull_tags: true,
            follow_tags_when_sync: false,
            prune_on_fetch: false,
            autorefresh: true,
            status_limit: 5000,
            timeout: Duration::from_millis(30_000),
            network_timeout: None,
            git_path_hints: Vec::new(),
            serialized_operations: vec![OperationKind::Pull, OperationKind::Push, OperationKind::Sync],
        }
    }
}

impl Settings {
    pub fn from_store(store: &dyn SettingsStore) -> Self {
        let defaults = Self::default();

        let timeout_ms: u64 = read(store, "git.timeoutMs").unwrap_or(defaults.timeout.as_millis() as u64);
        // 0 or absent: no timer on network commands
        let network_timeout = read::<u64>(store, "git.networkTimeoutMs")
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);
        // `git.path` may be a single string or a list
        let git_path_hints = match store.get("git.path") {
            Some(Value::String(path)) => vec![PathBuf::from(path)],
            Some(value @ Value::Array(_)) => serde_json::from_value::<Vec<PathBuf>>(value)
                .unwrap_or_else(|e| {
                    log::warn!("Ignoring invalid git.path setting: {}", e);
                    Vec::new()
                }),
            _ => Vec::new(),
        };

        Self {
            auto_stash: read(store, "git.autoStash").unwrap_or(defaults.auto_stash),
            fetch_on_pull: read(store, "git.fetchOnPull").unwrap_or(defaults.fetch_on_pull),
            pull_tags: read(store, "git.pullTags").unwrap_or(defaults.pull_tags),
            follow_tags_when_sync: read(store, "git.followTagsWhenSync")
                .unwrap_or(defaults.follow_tags_when_sync),
            prune_on_fetch: read(store, "git.pruneOnFetch").unwrap_or(defaults.prune_on_fetch),
            autorefresh: read(store, "git.autorefresh").unwrap_or(defaults.autorefresh),
            status_limit: read(store, "git.statusLimit").unwrap_or(defaults.status_limit),
            timeout: Duration::from_millis(timeout_ms.max(1)),
            network_timeout,
            git_path_hints,
            serialized_operations: read(store, "git.serializedOperations")
                .unwrap_or(defaults.serialized_operations),
        }
    }
}

fn read<T: DeserializeOwned>(store: &dyn SettingsStore, key: &str) -> Option<T> {
    let value = store.get(key)?;
    match serde_json::from_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            log::warn!("Ignoring invalid value for setting {}: {}", key, e);
            None
        }
    }
}
