//! Daemon configuration.
//!
//! Read from TOML with every field defaulted. Lookup order is an explicit
//! path, then `KEEPUP_CONFIG`, then `<config_dir>/keepup/config.toml`.
//! A missing file yields defaults; a malformed one is an error.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default RPC bind address.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:42424";

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "KEEPUP_CONFIG";

/// Environment variable overriding the RPC bind address.
pub const ADDRESS_ENV: &str = "KEEPUP_ADDRESS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// External tool locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Session launcher binary.
    pub tmux: PathBuf,
    /// Game server executable used when a server has no custom one.
    pub executable: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            tmux: PathBuf::from("tmux"),
            executable: PathBuf::from("etded"),
        }
    }
}

/// Configuration shared by the coordinator, dispatcher and server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// RPC bind address. A leading `tcp://` is accepted.
    pub address: String,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Persisted registry file.
    pub registry_path: PathBuf,
    pub paths: PathsConfig,
    pub watchdog_interval_ms: u64,
    /// Wait between the quit command and the termination signal.
    pub stop_grace_ms: u64,
    pub probe_timeout_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            log_level: "info".to_string(),
            registry_path: state_dir().join("servers.json"),
            paths: PathsConfig::default(),
            watchdog_interval_ms: 1000,
            stop_grace_ms: 1000,
            probe_timeout_ms: 1000,
        }
    }
}

impl DaemonConfig {
    /// Loads the configuration and applies environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(default_config_path);

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Ok(address) = std::env::var(ADDRESS_ENV) {
            if !address.trim().is_empty() {
                config.address = address;
            }
        }

        Ok(config)
    }

    /// Reads a config file. A missing file yields the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Bind address with any `tcp://` scheme removed.
    pub fn bind_address(&self) -> &str {
        let trimmed = self.address.trim();
        trimmed.strip_prefix("tcp://").unwrap_or(trimmed)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms.max(1))
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.max(1))
    }
}

/// `<state_dir>/keepup`, falling back to `/tmp/keepup`.
pub fn state_dir() -> PathBuf {
    dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("keepup")
}

/// `<config_dir>/keepup/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("keepup").join("config.toml"))
}
