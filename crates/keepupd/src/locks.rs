//! Per-server lifecycle serialization.
//!
//! At most one lifecycle operation (start, stop, restart, watchdog restart)
//! runs for a given server name at a time. Client operations wait for the
//! lock; the watchdog only tries it and skips busy servers.
//!
//! Slots live only while someone holds or waits on them. The last guard to
//! release a slot removes it from the table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot = Arc<AsyncMutex<()>>;

/// Held for the duration of one lifecycle operation.
pub struct LifecycleGuard {
    guard: Option<OwnedMutexGuard<()>>,
    name: String,
    locks: LifecycleLocks,
}

impl Drop for LifecycleGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.name);
    }
}

/// Lock table keyed by server name.
#[derive(Clone, Default)]
pub struct LifecycleLocks {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl LifecycleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // The map is only touched for a lookup or removal, so a poisoned
        // lock still holds a consistent table.
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn slot(&self, name: &str) -> Slot {
        Arc::clone(self.table().entry(name.to_string()).or_default())
    }

    /// Drops the slot once only the table still references it.
    fn release(&self, name: &str) {
        let mut slots = self.table();
        if slots.get(name).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            slots.remove(name);
        }
    }

    fn wrap(&self, name: &str, guard: OwnedMutexGuard<()>) -> LifecycleGuard {
        LifecycleGuard {
            guard: Some(guard),
            name: name.to_string(),
            locks: self.clone(),
        }
    }

    /// Waits until no other lifecycle operation runs for `name`.
    pub async fn acquire(&self, name: &str) -> LifecycleGuard {
        let guard = self.slot(name).lock_owned().await;
        self.wrap(name, guard)
    }

    /// Returns `None` if an operation for `name` is in flight.
    pub fn try_acquire(&self, name: &str) -> Option<LifecycleGuard> {
        let guard = self.slot(name).try_lock_owned().ok()?;
        Some(self.wrap(name, guard))
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.table().len()
    }
}
