//! Configuration
//!
//! Cloud sync settings live in `sync_config.json` inside the data
//! directory. When the file is missing or incomplete the app stays local.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use taskboard_core::{DEFAULT_CHANNEL, DEFAULT_STORAGE_KEY, DEFAULT_TABLE};
use thiserror::Error;
use tracing::warn;

pub const SYNC_CONFIG_FILE: &str = "sync_config.json";

/// Local blob limit, in the range browsers give local storage
pub const DEFAULT_STORAGE_QUOTA: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to encode sync configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cloud sync connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub url: String,
    pub token: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_channel() -> String {
    DEFAULT_CHANNEL.to_string()
}

impl SyncConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            table: default_table(),
            channel: default_channel(),
        }
    }

    /// Both URL and token are required to talk to the backend
    pub fn is_enabled(&self) -> bool {
        !self.url.trim().is_empty() && !self.token.trim().is_empty()
    }
}

/// Read the saved sync configuration, `None` when absent or unreadable
pub fn get_sync_config(dir: &Path) -> Option<SyncConfig> {
    let path = dir.join(SYNC_CONFIG_FILE);
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cannot read sync configuration");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Ignoring malformed sync configuration");
            None
        }
    }
}

pub fn save_sync_config(dir: &Path, config: &SyncConfig) -> Result<(), ConfigError> {
    fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let path = dir.join(SYNC_CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    fs::write(&path, json).map_err(|source| ConfigError::Io { path, source })
}

/// Forget the sync configuration, switching back to local storage
pub fn remove_sync_config(dir: &Path) -> Result<(), ConfigError> {
    let path = dir.join(SYNC_CONFIG_FILE);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

/// Everything needed to build the app
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub storage_key: String,
    pub storage_quota_bytes: Option<usize>,
    /// Present only when usable
    pub sync: Option<SyncConfig>,
}

impl AppConfig {
    pub fn load(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            log_dir: data_dir.join("logs"),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            storage_quota_bytes: Some(DEFAULT_STORAGE_QUOTA),
            sync: get_sync_config(&data_dir).filter(SyncConfig::is_enabled),
            data_dir,
        }
    }
}
