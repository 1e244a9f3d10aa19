//! Typed error hierarchy for board-sync.
//!
//! Two top-level enums cover the two subsystems:
//! - `SyncError`: channel, decoding and target failures inside the sync layer
//! - `ConfigError`: `sync.toml` loading, saving and validation failures
//!
//! None of the `SyncError` variants escape the coordinator: they end in a
//! transition to polling plus a log entry.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors from the synchronization layer.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to open channel to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Channel for project {project_id} did not open within {timeout:?}")]
    ConnectTimeout {
        project_id: String,
        timeout: Duration,
    },

    #[error("Channel transport error: {0}")]
    Transport(String),

    #[error("Malformed channel frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Invalid project id '{value}': {reason}")]
    InvalidProjectId { value: String, reason: &'static str },
}

/// Errors from the configuration layer.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to write config file at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
