//! Managed server configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Failure, Mod};

/// Address probed and advertised when a server has none configured.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1";

/// Message returned for a missing, non-numeric or out of range port.
pub const PORT_RANGE_MESSAGE: &str =
    "Server must have a port and it must be between 1024 and 65536.";

// ============================================================================
// ServerConfig
// ============================================================================

/// Immutable-once-added description of one managed instance.
///
/// `name` and `port` are both unique keys across the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub port: u16,
    #[serde(alias = "basepath")]
    pub base_path: PathBuf,
    #[serde(alias = "homepath")]
    pub home_path: PathBuf,
    #[serde(rename = "mod")]
    pub game_mod: Mod,
    #[serde(alias = "user")]
    pub os_user: String,
    #[serde(default, alias = "configs")]
    pub config_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_executable: Option<PathBuf>,
}

impl ServerConfig {
    /// Name of the detached session the server runs in.
    ///
    /// Unique because both name and port are unique.
    pub fn session_name(&self) -> String {
        format!("{}{}", self.name, self.port)
    }

    /// Address used for status probes.
    pub fn probe_address(&self) -> &str {
        self.address.as_deref().unwrap_or(DEFAULT_ADDRESS)
    }

    /// Executable to launch: the custom override or the given default.
    pub fn executable<'a>(&'a self, default: &'a Path) -> &'a Path {
        self.custom_executable.as_deref().unwrap_or(default)
    }
}

// ============================================================================
// ServerDraft
// ============================================================================

/// Unvalidated server configuration as received in an `AddServer` command.
///
/// Every field is optional so that validation can report the first bad
/// field in a fixed order instead of failing on the first decode error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDraft {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    /// Number or numeric string.
    #[serde(default)]
    pub port: Option<serde_json::Value>,
    #[serde(default, alias = "basepath")]
    pub base_path: Option<PathBuf>,
    #[serde(default, alias = "homepath")]
    pub home_path: Option<PathBuf>,
    #[serde(default, rename = "mod")]
    pub game_mod: Option<String>,
    #[serde(default, alias = "user")]
    pub os_user: Option<String>,
    #[serde(default, alias = "configs")]
    pub config_files: Option<Vec<String>>,
    #[serde(default)]
    pub custom_executable: Option<PathBuf>,
}

impl From<&ServerConfig> for ServerDraft {
    fn from(config: &ServerConfig) -> Self {
        Self {
            name: Some(config.name.clone()),
            address: config.address.clone(),
            port: Some(serde_json::Value::from(config.port)),
            base_path: Some(config.base_path.clone()),
            home_path: Some(config.home_path.clone()),
            game_mod: Some(config.game_mod.as_str().to_string()),
            os_user: Some(config.os_user.clone()),
            config_files: Some(config.config_files.clone()),
            custom_executable: config.custom_executable.clone(),
        }
    }
}

/// Parses a wire port value: a JSON number or a numeric string.
///
/// Valid ports lie strictly between 1024 and 65536.
pub fn parse_port(value: Option<&serde_json::Value>) -> Result<u16, Failure> {
    let invalid = || Failure::validation(PORT_RANGE_MESSAGE);

    let number = match value {
        Some(serde_json::Value::Number(n)) => match n.as_i64() {
            Some(i) => i,
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.is_finite() => f as i64,
                _ => return Err(invalid()),
            },
        },
        Some(serde_json::Value::String(s)) => s.trim().parse::<i64>().map_err(|_| invalid())?,
        _ => return Err(invalid()),
    };

    if number <= 1024 || number >= 65536 {
        return Err(invalid());
    }

    u16::try_from(number).map_err(|_| invalid())
}

// ============================================================================
// ServerPatch
// ============================================================================

/// Partial field set carried by `EditServer`. Absent fields stay unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<serde_json::Value>,
    #[serde(default, alias = "basepath", skip_serializing_if = "Option::is_none")]
    pub base_path: Option<PathBuf>,
    #[serde(default, alias = "homepath", skip_serializing_if = "Option::is_none")]
    pub home_path: Option<PathBuf>,
    #[serde(default, rename = "mod", skip_serializing_if = "Option::is_none")]
    pub game_mod: Option<String>,
    #[serde(default, alias = "user", skip_serializing_if = "Option::is_none")]
    pub os_user: Option<String>,
    #[serde(default, alias = "configs", skip_serializing_if = "Option::is_none")]
    pub config_files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_executable: Option<PathBuf>,
}

impl ServerPatch {
    /// Returns true if the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
