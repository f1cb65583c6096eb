//! Error types for the keepup client.

use std::io;
use thiserror::Error;

/// Errors talking to the daemon.
///
/// A daemon that answers with `success: false` is not an error at this
/// level; the caller gets the [`keepup_protocol::Response`] and decides.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not open a connection.
    #[error("Failed to connect to daemon at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    /// The daemon did not answer in time.
    #[error("Timed out waiting for daemon reply")]
    Timeout,

    /// The daemon closed the connection before replying.
    #[error("Daemon closed the connection")]
    Closed,

    /// Reply id does not match the request.
    #[error("Reply id mismatch (sent {sent}, got {received:?})")]
    IdMismatch {
        sent: String,
        received: Option<String>,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse reply: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
