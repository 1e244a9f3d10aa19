//! Configuration for board-sync.
//!
//! Settings are read from `.board-sync/sync.toml` and layered as
//! file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! url = "http://localhost:8000"
//! path_template = "/api/v1/projects/{project_id}/subscribe"
//!
//! [timing]
//! poll_interval_ms = 5000
//! connect_timeout_ms = 5000
//! reconnect_base_ms = 1000
//! reconnect_max_ms = 30000
//!
//! [polling]
//! start = "immediate"
//! ```
//!
//! Environment overrides: `BOARD_SYNC_URL`, `BOARD_SYNC_POLL_INTERVAL_MS`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::sync::backoff::ReconnectPolicy;
use crate::sync::coordinator::{PollStart, SyncOptions};
use crate::sync::ws::{DEFAULT_PATH_TEMPLATE, WsConnector};

pub const CONFIG_DIR: &str = ".board-sync";
pub const CONFIG_FILE: &str = "sync.toml";

pub const ENV_URL: &str = "BOARD_SYNC_URL";
pub const ENV_POLL_INTERVAL_MS: &str = "BOARD_SYNC_POLL_INTERVAL_MS";

const DEFAULT_SERVER_URL: &str = "http://localhost:8000";

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_server_url")]
    pub url: String,
    /// Channel path; `{project_id}` is replaced with the target.
    #[serde(default = "default_path_template")]
    pub path_template: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            url: default_server_url(),
            path_template: default_path_template(),
        }
    }
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

fn default_path_template() -> String {
    DEFAULT_PATH_TEMPLATE.to_string()
}

/// `[timing]` section, all values in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_reconnect_base_ms() -> u64 {
    1000
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

/// `[polling]` section.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingSection {
    #[serde(default)]
    pub start: PollStart,
}

/// Contents of `sync.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub timing: TimingSection,
    #[serde(default)]
    pub polling: PollingSection,
}

impl SyncToml {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load `sync.toml` from `config_dir`, or defaults when it is missing.
    pub fn load_or_default(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Human-readable list of problems; empty when the file is valid.
    pub fn validate(&self) -> Vec<String> {
        self.problems().iter().map(ToString::to_string).collect()
    }

    fn problems(&self) -> Vec<ConfigError> {
        let mut problems = Vec::new();
        let mut invalid = |key: &str, message: &str| {
            problems.push(ConfigError::InvalidValue {
                key: key.to_string(),
                message: message.to_string(),
            })
        };

        let url = self.server.url.as_str();
        if !["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| url.starts_with(scheme))
        {
            invalid("server.url", "must start with http://, https://, ws:// or wss://");
        }
        if !self.server.path_template.contains("{project_id}") {
            invalid("server.path_template", "must contain {project_id}");
        }
        if self.timing.poll_interval_ms == 0 {
            invalid("timing.poll_interval_ms", "must be greater than zero");
        }
        if self.timing.connect_timeout_ms == 0 {
            invalid("timing.connect_timeout_ms", "must be greater than zero");
        }
        if self.timing.reconnect_base_ms == 0 {
            invalid("timing.reconnect_base_ms", "must be greater than zero");
        }
        if self.timing.reconnect_max_ms < self.timing.reconnect_base_ms {
            invalid(
                "timing.reconnect_max_ms",
                "must not be smaller than reconnect_base_ms",
            );
        }
        problems
    }
}

/// Effective settings after layering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub config_path: PathBuf,
    pub server_url: String,
    pub path_template: String,
    pub options: SyncOptions,
}

impl SyncConfig {
    /// Load from `<project_dir>/.board-sync/sync.toml`, the process
    /// environment and an optional CLI URL override.
    pub fn load(project_dir: &Path, cli_url: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = project_dir.join(CONFIG_DIR);
        let toml = SyncToml::load_or_default(&config_dir)?;
        Self::from_sources(
            config_dir.join(CONFIG_FILE),
            toml,
            |key| std::env::var(key).ok(),
            cli_url,
        )
    }

    pub fn from_sources(
        config_path: PathBuf,
        mut toml: SyncToml,
        env: impl Fn(&str) -> Option<String>,
        cli_url: Option<&str>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = env(ENV_URL) {
            toml.server.url = url;
        }
        if let Some(raw) = env(ENV_POLL_INTERVAL_MS) {
            toml.timing.poll_interval_ms =
                raw.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_POLL_INTERVAL_MS.to_string(),
                        message: format!("'{}' is not a number of milliseconds", raw),
                    })?;
        }
        if let Some(url) = cli_url {
            toml.server.url = url.to_string();
        }

        if let Some(problem) = toml.problems().into_iter().next() {
            return Err(problem);
        }

        let timing = toml.timing;
        Ok(Self {
            config_path,
            server_url: toml.server.url,
            path_template: toml.server.path_template,
            options: SyncOptions {
                poll_interval: Duration::from_millis(timing.poll_interval_ms),
                connect_timeout: Duration::from_millis(timing.connect_timeout_ms),
                reconnect: ReconnectPolicy::new(
                    Duration::from_millis(timing.reconnect_base_ms),
                    Duration::from_millis(timing.reconnect_max_ms),
                ),
                poll_start: toml.polling.start,
            },
        })
    }

    pub fn connector(&self) -> WsConnector {
        WsConnector::new(self.server_url.clone()).with_path_template(self.path_template.clone())
    }
}
