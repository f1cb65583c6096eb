//! Managed server records: configuration plus coordinator-private state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ServerConfig;

/// Wire and disk sentinel for "not running".
pub const NOT_RUNNING: i64 = -1;

/// Consecutive failed automatic restarts before the watchdog gives up on a server.
pub const MAX_RESTART_ATTEMPTS: u32 = 5;

/// A managed server as stored in the registry.
///
/// `process_id` is desired state: `Some` means the coordinator wants the
/// server running, regardless of whether the OS process still exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagedServerRecord {
    #[serde(flatten)]
    pub config: ServerConfig,

    #[serde(default, with = "process_id")]
    pub process_id: Option<u32>,

    #[serde(default)]
    pub restart_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ManagedServerRecord {
    /// Creates a freshly added, not running record.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            process_id: None,
            restart_attempts: 0,
            started_at: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// True if the coordinator wants this server running.
    pub fn is_running(&self) -> bool {
        self.process_id.is_some()
    }

    /// True once the watchdog has used up its restart budget.
    pub fn restarts_exhausted(&self) -> bool {
        self.restart_attempts >= MAX_RESTART_ATTEMPTS
    }

    /// Records a successful (re)start.
    pub fn mark_started(&mut self, pid: u32, at: DateTime<Utc>) {
        self.process_id = Some(pid);
        self.restart_attempts = 0;
        self.started_at = Some(at);
    }

    /// Records a stop, whether graceful or forced.
    pub fn mark_stopped(&mut self) {
        self.process_id = None;
        self.started_at = None;
    }

    /// Records a failed automatic restart and returns the new attempt count.
    pub fn record_restart_failure(&mut self) -> u32 {
        self.restart_attempts = self.restart_attempts.saturating_add(1);
        self.restart_attempts
    }
}

/// Serializes `Option<u32>` as a pid or the `-1` sentinel.
mod process_id {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::NOT_RUNNING;

    pub fn serialize<S: Serializer>(pid: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(pid.map(i64::from).unwrap_or(NOT_RUNNING))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        let raw = i64::deserialize(deserializer)?;
        if raw <= 0 {
            return Ok(None);
        }
        u32::try_from(raw)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("process id out of range: {raw}")))
    }
}
