//! Operation failure taxonomy following panic-free policy.
//!
//! Every lifecycle operation ends in either a success message or exactly one
//! of these failures. The `Display` output is what clients see on the wire.

use thiserror::Error;

/// Reasons an operation against the managed servers can fail.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// Bad add/edit input. The message names the offending field.
    #[error("{0}")]
    Validation(String),

    /// No managed server with this name.
    #[error("Server {0} does not exist.")]
    NotFound(String),

    /// The server is tracked as running and its process is alive.
    #[error("Server {0} is already running.")]
    AlreadyRunning(String),

    /// The server is not tracked as running.
    #[error("Server {0} is not running.")]
    NotRunning(String),

    /// The configured OS user could not be resolved.
    #[error("User {0} does not exist. Cannot start server.")]
    UserResolution(String),

    /// The process launcher failed to spawn, inject or signal.
    #[error("Process error: {0}")]
    Process(String),

    /// Operation is part of the protocol but has no implementation yet.
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),

    /// Status probe timed out.
    #[error("Could not reach server: {address}")]
    Unreachable { address: String },

    /// Socket bind/send error.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed wire JSON or malformed status reply.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Unexpected internal error. The detail is for logs only and never
    /// rendered on the wire.
    #[error("Internal service error.")]
    Internal(String),
}

impl Failure {
    /// Creates a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an internal failure from any displayable error.
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        Self::Internal(err.to_string())
    }

    /// Short machine-readable label, used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::AlreadyRunning(_) => "already_running",
            Self::NotRunning(_) => "not_running",
            Self::UserResolution(_) => "user_resolution",
            Self::Process(_) => "process",
            Self::NotImplemented(_) => "not_implemented",
            Self::Unreachable { .. } => "unreachable",
            Self::Transport(_) => "transport",
            Self::Parse(_) => "parse",
            Self::Internal(_) => "internal",
        }
    }
}

/// Result of a lifecycle operation: a human-readable success message or a failure.
pub type Outcome = Result<String, Failure>;
