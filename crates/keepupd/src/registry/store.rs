//! Durable registry file.
//!
//! The registry is a JSON array of records, rewritten wholesale on every
//! mutation. Writes go to a sibling temp file which is then renamed over
//! the original, so a crash mid-write leaves the previous contents intact.

use std::io::Write;
use std::path::{Path, PathBuf};

use keepup_core::ManagedServerRecord;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to read registry {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("registry {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write registry {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode registry: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Reads and writes the registry file.
#[derive(Debug, Clone)]
pub struct RegistryStore {
    path: PathBuf,
}

impl RegistryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all records in file order.
    ///
    /// A missing or blank file is an empty registry. Anything else that
    /// fails to parse is [`StoreError::Corrupt`] and must stop startup.
    pub fn load(&self) -> Result<Vec<ManagedServerRecord>, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No registry file, starting empty");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Overwrites the file with `records`.
    pub fn save(&self, records: &[ManagedServerRecord]) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(records).map_err(StoreError::Encode)?;
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }

        let tmp = self.tmp_path();
        let mut file = std::fs::File::create(&tmp).map_err(write_err)?;
        file.write_all(&json).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);
        std::fs::rename(&tmp, &self.path).map_err(write_err)?;

        debug!(path = %self.path.display(), count = records.len(), "Registry saved");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "registry".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keepup_core::{Mod, ServerConfig};

    fn record(name: &str, port: u16) -> ManagedServerRecord {
        ManagedServerRecord::new(ServerConfig {
            name: name.into(),
            address: None,
            port,
            base_path: "/srv/et".into(),
            home_path: "/srv/home".into(),
            game_mod: Mod::Etmain,
            os_user: "et".into(),
            config_files: vec!["a.cfg".into(), "b.cfg".into()],
            custom_executable: None,
        })
    }

    #[test]
    fn test_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("servers.json"));

        let mut running = record("zulu", 27961);
        running.mark_started(4242, chrono::Utc::now());
        let records = vec![running, record("alpha", 27960), record("mike", 27962)];

        store.save(&records).unwrap();
        assert_eq!(store.load().unwrap(), records);
    }

    #[test]
    fn test_missing_and_blank_are_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("servers.json"));
        assert!(store.load().unwrap().is_empty());

        std::fs::write(store.path(), "  \n").unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = RegistryStore::new(dir.path().join("servers.json"));
        std::fs::write(store.path(), "[{\"name\": ").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn test_save_creates_parent_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("servers.json");
        let store = RegistryStore::new(&path);
        store.save(&[record("alpha", 27960)]).unwrap();
        assert!(path.exists());
        assert!(!dir.path().join("nested").join("servers.json.tmp").exists());
    }
}
