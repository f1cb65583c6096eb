//! Registry actor commands and errors.

use keepup_core::ManagedServerRecord;
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for the response.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Append a new record and persist.
    ///
    /// # Errors
    /// - `RegistryError::DuplicateName` / `DuplicatePort` on a key clash
    /// - `RegistryError::Persist` if the file could not be written; the
    ///   insert is rolled back
    Insert {
        record: Box<ManagedServerRecord>,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Replace the record with the same name and persist.
    ///
    /// The in-memory change is kept even if persisting fails, since it
    /// reflects processes that were actually started or stopped.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` if no record has this name
    /// - `RegistryError::Persist` if the file could not be written
    Update {
        record: Box<ManagedServerRecord>,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Get a single record by name.
    Get {
        name: String,
        respond_to: oneshot::Sender<Option<ManagedServerRecord>>,
    },

    /// Get all records in registry order.
    GetAll {
        respond_to: oneshot::Sender<Vec<ManagedServerRecord>>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("server name already registered: {0}")]
    DuplicateName(String),

    #[error("server port already registered: {0}")]
    DuplicatePort(u16),

    #[error("server not found: {0}")]
    NotFound(String),

    #[error("failed to persist registry: {0}")]
    Persist(String),

    /// The actor has shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_error_display() {
        assert_eq!(
            RegistryError::DuplicatePort(27960).to_string(),
            "server port already registered: 27960"
        );
        assert!(RegistryError::Persist("disk full".into())
            .to_string()
            .contains("disk full"));
    }
}
