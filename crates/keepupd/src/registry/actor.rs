//! Registry actor - owns all managed server records.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Response send failures are ignored (the caller went away)
//! - Persistence failures are logged and reported, never fatal

use keepup_core::ManagedServerRecord;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::commands::{RegistryCommand, RegistryError};
use super::store::RegistryStore;

/// The registry actor.
///
/// Processes commands sequentially in a single task, so every mutation and
/// the write that follows it happen without interleaving.
pub struct RegistryActor {
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Records in insertion order, which is also the persisted order.
    records: Vec<ManagedServerRecord>,

    store: RegistryStore,
}

impl RegistryActor {
    /// Creates an actor over already-loaded records.
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        records: Vec<ManagedServerRecord>,
        store: RegistryStore,
    ) -> Self {
        Self {
            receiver,
            records,
            store,
        }
    }

    /// Runs until every handle has been dropped.
    pub async fn run(mut self) {
        info!(
            servers = self.records.len(),
            path = %self.store.path().display(),
            "Registry actor starting"
        );

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!(servers = self.records.len(), "Registry actor stopped");
    }

    async fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Insert { record, respond_to } => {
                let result = self.handle_insert(*record).await;
                let _ = respond_to.send(result);
            }
            RegistryCommand::Update { record, respond_to } => {
                let result = self.handle_update(*record).await;
                let _ = respond_to.send(result);
            }
            RegistryCommand::Get { name, respond_to } => {
                let result = self.records.iter().find(|r| r.name() == name).cloned();
                let _ = respond_to.send(result);
            }
            RegistryCommand::GetAll { respond_to } => {
                let _ = respond_to.send(self.records.clone());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    async fn handle_insert(&mut self, record: ManagedServerRecord) -> Result<(), RegistryError> {
        if self.records.iter().any(|r| r.name() == record.name()) {
            return Err(RegistryError::DuplicateName(record.name().to_string()));
        }
        if self.records.iter().any(|r| r.config.port == record.config.port) {
            return Err(RegistryError::DuplicatePort(record.config.port));
        }

        let name = record.name().to_string();
        self.records.push(record);

        if let Err(e) = self.persist().await {
            self.records.pop();
            return Err(e);
        }

        debug!(server = %name, total = self.records.len(), "Server added");
        Ok(())
    }

    async fn handle_update(&mut self, record: ManagedServerRecord) -> Result<(), RegistryError> {
        let slot = self
            .records
            .iter_mut()
            .find(|r| r.name() == record.name())
            .ok_or_else(|| RegistryError::NotFound(record.name().to_string()))?;

        debug!(
            server = %record.name(),
            pid = ?record.process_id,
            attempts = record.restart_attempts,
            "Server record updated"
        );
        *slot = record;

        self.persist().await
    }

    /// Writes the current records on the blocking pool.
    async fn persist(&self) -> Result<(), RegistryError> {
        let store = self.store.clone();
        let records = self.records.clone();

        let failure = match tokio::task::spawn_blocking(move || store.save(&records)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(e) => format!("registry writer failed: {e}"),
        };
        error!(error = %failure, "Failed to persist registry");
        Err(RegistryError::Persist(failure))
    }
}
