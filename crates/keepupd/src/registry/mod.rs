//! Managed server registry using the actor pattern.
//!
//! The registry is the single owner of every `ManagedServerRecord`. It
//! receives commands over an mpsc channel, applies them one at a time and
//! rewrites the backing file after each mutation.
//!
//! ```text
//! ┌──────────────────┐  RegistryCommand   ┌─────────────────┐  save()  ┌──────────────┐
//! │ServerCoordinator │───────────────────▶│  RegistryActor  │─────────▶│ servers.json │
//! │   + watchdog     │   (mpsc channel)   │ Vec<Record>     │          └──────────────┘
//! └──────────────────┘                    └─────────────────┘
//! ```

use keepup_core::ManagedServerRecord;
use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;
mod store;

pub use actor::RegistryActor;
pub use commands::{RegistryCommand, RegistryError};
pub use handle::RegistryHandle;
pub use store::{RegistryStore, StoreError};

/// Command channel buffer size.
const COMMAND_BUFFER: usize = 100;

/// Loads the registry from `store` and spawns its actor.
///
/// # Errors
///
/// Returns the store error if the file exists but cannot be read or
/// parsed. Callers must treat this as fatal rather than start empty.
pub fn spawn_registry(store: RegistryStore) -> Result<RegistryHandle, StoreError> {
    let records = store.load()?;
    Ok(spawn_loaded_registry(store, records))
}

/// Spawns the actor over records the caller already loaded from `store`.
pub fn spawn_loaded_registry(
    store: RegistryStore,
    records: Vec<ManagedServerRecord>,
) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let actor = RegistryActor::new(cmd_rx, records, store);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
