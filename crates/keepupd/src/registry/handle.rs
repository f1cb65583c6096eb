//! Client interface for the registry actor.
//!
//! # Panic-Free Guarantees
//!
//! Channel errors are mapped to `RegistryError::ChannelClosed` for
//! mutations, and to empty results for reads.

use keepup_core::ManagedServerRecord;
use tokio::sync::{mpsc, oneshot};

use super::commands::{RegistryCommand, RegistryError};

/// Cheap-to-clone handle to the registry actor.
#[derive(Clone)]
pub struct RegistryHandle {
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Adds a new record.
    ///
    /// # Errors
    ///
    /// - `RegistryError::DuplicateName` / `DuplicatePort`
    /// - `RegistryError::Persist` if the registry could not be written
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn insert(&self, record: ManagedServerRecord) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Insert {
                record: Box::new(record),
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Replaces the record with the same name.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotFound` if no record has this name
    /// - `RegistryError::Persist` if the registry could not be written
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn update(&self, record: ManagedServerRecord) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Update {
                record: Box::new(record),
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)?
    }

    /// Returns `None` if the record doesn't exist or the actor is gone.
    pub async fn get(&self, name: &str) -> Option<ManagedServerRecord> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::Get {
                name: name.to_string(),
                respond_to: tx,
            })
            .await
            .ok()?;

        rx.await.ok()?
    }

    /// Returns every record in registry order.
    pub async fn get_all(&self) -> Vec<ManagedServerRecord> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::GetAll { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }
}
