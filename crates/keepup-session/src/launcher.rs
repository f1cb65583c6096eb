//! The process launching seam.
//!
//! The coordinator only ever talks to a [`ProcessLauncher`], so tests can
//! substitute an in-memory fake for real sessions and signals.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::Identity;

/// Errors from launching, injecting into, or signalling a session.
#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: &'static str,
        status: String,
        stderr: String,
    },

    #[error("unexpected pane pid output: {0:?}")]
    BadPanePid(String),

    #[error("refusing to signal pid {0}")]
    InvalidPid(u32),

    #[error("failed to signal pid {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: std::io::Error,
    },
}

/// Everything needed to start one server in a detached session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Session name, unique per server.
    pub session: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub identity: Identity,
}

/// Starts, feeds and stops detached server processes.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Starts the program in a new detached session and returns its pid.
    async fn spawn(&self, spec: &LaunchSpec) -> Result<u32, LaunchError>;

    /// Types `text` followed by Enter into the session's console.
    async fn inject(&self, session: &str, text: &str, identity: &Identity)
        -> Result<(), LaunchError>;

    /// Asks the process to terminate.
    fn terminate(&self, pid: u32) -> Result<(), LaunchError>;

    /// Returns true if the pid refers to a live process.
    fn is_alive(&self, pid: u32) -> bool;
}
