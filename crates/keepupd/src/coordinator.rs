//! Server coordinator - lifecycle operations over the registry.
//!
//! Every public operation is total: it returns an [`Outcome`] (or a typed
//! result for queries) and never panics or propagates raw errors.
//! Lifecycle operations for one server are serialized through
//! [`LifecycleLocks`]; different servers proceed independently.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Launcher and registry errors become `Failure` values
//! - Unexpected errors are logged here and surface as `Failure::Internal`

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use keepup_core::{
    parse_port, Failure, ManagedServerRecord, Mod, Outcome, ServerConfig, ServerDraft,
    ServerPatch,
};
use keepup_protocol::ServerStatus;
use keepup_session::{LaunchSpec, ProcessLauncher, UserResolver};
use tracing::{debug, error, info, warn};

use crate::config::DaemonConfig;
use crate::locks::LifecycleLocks;
use crate::probe::StatusProbe;
use crate::registry::{RegistryError, RegistryHandle};

/// Console command that makes a server exit cleanly.
const QUIT_COMMAND: &str = "quit";

/// Map loaded at startup; server configs usually rotate away from it.
const STARTUP_MAP: &str = "oasis";

/// Hunk memory in megabytes.
const HUNK_MEGS: &str = "128";

/// Result of one watchdog pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Servers whose desired state is running.
    pub checked: usize,
    pub restarted: usize,
    pub failed: usize,
    /// Skipped because a client operation held the lifecycle lock.
    pub busy: usize,
    /// Dead, but the restart budget is used up.
    pub exhausted: usize,
}

/// Owns lifecycle operations for every managed server.
///
/// Cheap to clone; clones share the registry, launcher and lock table.
#[derive(Clone)]
pub struct ServerCoordinator {
    registry: RegistryHandle,
    launcher: Arc<dyn ProcessLauncher>,
    users: Arc<dyn UserResolver>,
    probe: StatusProbe,
    locks: LifecycleLocks,
    config: Arc<DaemonConfig>,
}

impl ServerCoordinator {
    pub fn new(
        registry: RegistryHandle,
        launcher: Arc<dyn ProcessLauncher>,
        users: Arc<dyn UserResolver>,
        config: Arc<DaemonConfig>,
    ) -> Self {
        Self {
            registry,
            launcher,
            users,
            probe: StatusProbe::new(config.probe_timeout()),
            locks: LifecycleLocks::new(),
            config,
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Returns all records, or only those named in `names` when non-empty.
    pub async fn list_servers(&self, names: &[String]) -> Vec<ManagedServerRecord> {
        let all = self.registry.get_all().await;
        if names.is_empty() {
            return all;
        }
        all.into_iter()
            .filter(|r| names.iter().any(|n| n == r.name()))
            .collect()
    }

    /// Probes a managed server at its configured address and port.
    pub async fn server_status(&self, name: &str) -> Result<ServerStatus, Failure> {
        let record = self.find(name).await?;
        let status = self
            .probe
            .status(record.config.probe_address(), record.config.port)
            .await?;
        Ok(status)
    }

    // ========================================================================
    // Registry edits
    // ========================================================================

    /// Validates and registers a new server.
    ///
    /// Checks run in a fixed order and the first failure is returned.
    pub async fn add_server(&self, draft: Option<ServerDraft>) -> Outcome {
        let config = self.validate(draft).await?;
        let name = config.name.clone();

        self.registry
            .insert(ManagedServerRecord::new(config))
            .await
            .map_err(|e| match e {
                RegistryError::DuplicateName(n) => {
                    Failure::validation(format!("Server {n} already exists."))
                }
                RegistryError::DuplicatePort(p) => {
                    Failure::validation(format!("Server with port {p} already exists."))
                }
                other => self.internal("add", &name, other),
            })?;

        info!(server = %name, "Added server");
        Ok(format!("Server {name} added."))
    }

    /// Not implemented yet; fails with `NotFound` for unknown servers.
    pub async fn edit_server(&self, name: &str, changes: &ServerPatch) -> Outcome {
        self.find(name).await?;
        debug!(server = %name, empty = changes.is_empty(), "Edit requested");
        Err(Failure::NotImplemented("EditServer"))
    }

    /// Not implemented yet; fails with `NotFound` for unknown servers.
    pub async fn delete_server(&self, name: &str) -> Outcome {
        self.find(name).await?;
        Err(Failure::NotImplemented("DeleteServer"))
    }

    async fn validate(&self, draft: Option<ServerDraft>) -> Result<ServerConfig, Failure> {
        let draft = draft.ok_or_else(|| Failure::validation("Server must be defined."))?;

        let name = draft
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Failure::validation("Server must have a name."))?;

        let existing = self.registry.get_all().await;
        if existing.iter().any(|r| r.name() == name) {
            return Err(Failure::validation(format!("Server {name} already exists.")));
        }

        let port = parse_port(draft.port.as_ref())?;
        if existing.iter().any(|r| r.config.port == port) {
            return Err(Failure::validation(format!(
                "Server with port {port} already exists."
            )));
        }

        let base_path = match draft.base_path {
            Some(p) if is_dir(&p).await => p,
            _ => return Err(Failure::validation("Server basepath must exist.")),
        };

        let home_path = match draft.home_path {
            Some(p) if is_dir(&p).await => p,
            _ => return Err(Failure::validation("Server homepath must exist.")),
        };

        let game_mod = draft
            .game_mod
            .and_then(|m| m.parse::<Mod>().ok())
            .ok_or_else(|| {
                Failure::validation(format!(
                    "Server mod must be defined and be one of: {}",
                    Mod::allowed_list()
                ))
            })?;

        let os_user = draft
            .os_user
            .filter(|u| !u.trim().is_empty() && self.users.resolve(u).is_some())
            .ok_or_else(|| Failure::validation("Server must have a valid OS user."))?;

        Ok(ServerConfig {
            name,
            address: draft.address.filter(|a| !a.trim().is_empty()),
            port,
            base_path,
            home_path,
            game_mod,
            os_user,
            config_files: draft.config_files.unwrap_or_default(),
            custom_executable: draft.custom_executable,
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Starts a stopped server.
    pub async fn start_server(&self, name: &str) -> Outcome {
        self.find(name).await?;
        let _guard = self.locks.acquire(name).await;
        self.start_locked(name).await
    }

    /// Stops a running server: quit, grace period, then SIGTERM if needed.
    pub async fn stop_server(&self, name: &str) -> Outcome {
        self.find(name).await?;
        let _guard = self.locks.acquire(name).await;
        self.stop_locked(name).await
    }

    /// Stops the server if it is running, then starts it.
    pub async fn restart_server(&self, name: &str) -> Outcome {
        self.find(name).await?;
        let _guard = self.locks.acquire(name).await;

        match self.stop_locked(name).await {
            Ok(_) | Err(Failure::NotRunning(_)) => {}
            Err(e) => return Err(e),
        }
        self.start_locked(name).await?;

        Ok(format!("Restarted server: {name}"))
    }

    async fn start_locked(&self, name: &str) -> Outcome {
        let mut record = self.find(name).await?;

        if let Some(pid) = record.process_id {
            if self.launcher.is_alive(pid) {
                return Err(Failure::AlreadyRunning(name.to_string()));
            }
        }

        let pid = self.launch(&record.config).await?;
        record.mark_started(pid, Utc::now());
        self.commit(record).await?;

        info!(server = %name, pid, "Started server");
        Ok(format!("Started server: {name}"))
    }

    async fn stop_locked(&self, name: &str) -> Outcome {
        let mut record = self.find(name).await?;
        let Some(pid) = record.process_id else {
            return Err(Failure::NotRunning(name.to_string()));
        };

        let mut signal_error = None;
        if self.launcher.is_alive(pid) {
            self.request_quit(&record.config).await;
            tokio::time::sleep(self.config.stop_grace()).await;

            if self.launcher.is_alive(pid) {
                warn!(server = %name, pid, "Server ignored quit, sending SIGTERM");
                if let Err(e) = self.launcher.terminate(pid) {
                    error!(server = %name, pid, error = %e, "Failed to terminate server");
                    signal_error = Some(Failure::Process(e.to_string()));
                }
            }
        } else {
            debug!(server = %name, pid, "Process already gone");
        }

        record.mark_stopped();
        self.commit(record).await?;

        if let Some(failure) = signal_error {
            return Err(failure);
        }

        info!(server = %name, pid, "Stopped server");
        Ok(format!("Stopped server: {name}"))
    }

    /// Types the quit command into the server's session. Best effort.
    async fn request_quit(&self, config: &ServerConfig) {
        let Some(identity) = self.users.resolve(&config.os_user) else {
            warn!(server = %config.name, user = %config.os_user, "User not found, skipping quit");
            return;
        };

        if let Err(e) = self
            .launcher
            .inject(&config.session_name(), QUIT_COMMAND, &identity)
            .await
        {
            warn!(server = %config.name, error = %e, "Failed to send quit");
        }
    }

    /// Runs the start protocol and returns the tracked pid.
    async fn launch(&self, config: &ServerConfig) -> Result<u32, Failure> {
        let identity = self
            .users
            .resolve(&config.os_user)
            .ok_or_else(|| Failure::UserResolution(config.os_user.clone()))?;

        let spec = LaunchSpec {
            session: config.session_name(),
            program: config.executable(&self.config.paths.executable).to_path_buf(),
            args: launch_args(config),
            working_dir: config.base_path.clone(),
            identity,
        };

        debug!(
            server = %config.name,
            program = %spec.program.display(),
            args = %spec.args.join(" "),
            "Launching server"
        );

        self.launcher
            .spawn(&spec)
            .await
            .map_err(|e| Failure::Process(e.to_string()))
    }

    // ========================================================================
    // Watchdog
    // ========================================================================

    /// One reconciliation pass over every server that should be running.
    ///
    /// A dead server is restarted while its attempt count is below the cap.
    /// A restart only counts as successful if the new process is alive
    /// right after launch.
    pub async fn watchdog_tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        for snapshot in self.registry.get_all().await {
            if !snapshot.is_running() {
                continue;
            }
            summary.checked += 1;

            let name = snapshot.name().to_string();
            let Some(_guard) = self.locks.try_acquire(&name) else {
                debug!(server = %name, "Lifecycle operation in flight, skipping");
                summary.busy += 1;
                continue;
            };

            // Re-read under the lock; a client may have changed it since the snapshot.
            let Some(record) = self.registry.get(&name).await else {
                continue;
            };
            let Some(pid) = record.process_id else {
                continue;
            };
            if self.launcher.is_alive(pid) {
                continue;
            }
            if record.restarts_exhausted() {
                summary.exhausted += 1;
                continue;
            }

            if self.restart_dead(record, pid).await {
                summary.restarted += 1;
            } else {
                summary.failed += 1;
            }
        }

        summary
    }

    async fn restart_dead(&self, mut record: ManagedServerRecord, old_pid: u32) -> bool {
        let name = record.name().to_string();
        info!(
            server = %name,
            pid = old_pid,
            attempts = record.restart_attempts,
            "Server should be running, restarting"
        );

        let failure = match self.launch(&record.config).await {
            Ok(pid) if self.launcher.is_alive(pid) => {
                record.mark_started(pid, Utc::now());
                if let Err(e) = self.commit(record).await {
                    warn!(server = %name, error = %e, "Restarted but could not persist");
                }
                info!(server = %name, pid, "Server restarted");
                return true;
            }
            Ok(pid) => Failure::Process(format!("process {pid} exited right after launch")),
            Err(e) => e,
        };

        let attempts = record.record_restart_failure();
        error!(
            server = %name,
            attempts,
            error = %failure,
            "Could not restart server"
        );
        if record.restarts_exhausted() {
            warn!(server = %name, attempts, "Restart limit reached, giving up until started manually");
        }
        if let Err(e) = self.commit(record).await {
            warn!(server = %name, error = %e, "Could not persist restart attempt");
        }
        false
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn find(&self, name: &str) -> Result<ManagedServerRecord, Failure> {
        self.registry
            .get(name)
            .await
            .ok_or_else(|| Failure::NotFound(name.to_string()))
    }

    async fn commit(&self, record: ManagedServerRecord) -> Result<(), Failure> {
        let name = record.name().to_string();
        self.registry
            .update(record)
            .await
            .map_err(|e| self.internal("update", &name, e))
    }

    fn internal(&self, op: &str, name: &str, err: RegistryError) -> Failure {
        error!(server = %name, op, error = %err, "Registry operation failed");
        Failure::internal(err)
    }
}

/// Builds the game executable's argument list.
///
/// Order: memory, startup map, mod, config execs in declared order, port,
/// optional bind address, base and home paths.
pub fn launch_args(config: &ServerConfig) -> Vec<String> {
    let mut args = Vec::new();
    set_cvar(&mut args, "com_hunkmegs", HUNK_MEGS);
    args.push("+map".to_string());
    args.push(STARTUP_MAP.to_string());
    set_cvar(&mut args, "fs_game", config.game_mod.as_str());

    for file in &config.config_files {
        args.push("+exec".to_string());
        args.push(file.clone());
    }

    set_cvar(&mut args, "net_port", &config.port.to_string());
    if let Some(address) = &config.address {
        set_cvar(&mut args, "net_ip", address);
    }
    set_cvar(&mut args, "fs_basepath", &config.base_path.display().to_string());
    set_cvar(&mut args, "fs_homepath", &config.home_path.display().to_string());

    args
}

fn set_cvar(args: &mut Vec<String>, cvar: &str, value: &str) {
    args.push("+set".to_string());
    args.push(cvar.to_string());
    args.push(value.to_string());
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use keepup_session::{Identity, LaunchError};

    use crate::registry::{spawn_registry, RegistryStore};

    /// Launcher that must never be reached.
    struct Unreachable;

    #[async_trait::async_trait]
    impl ProcessLauncher for Unreachable {
        async fn spawn(&self, _spec: &LaunchSpec) -> Result<u32, LaunchError> {
            Err(LaunchError::CommandFailed {
                command: "tmux new-session",
                status: "exit status: 1".into(),
                stderr: "unexpected".into(),
            })
        }

        async fn inject(&self, _: &str, _: &str, _: &Identity) -> Result<(), LaunchError> {
            Ok(())
        }

        fn terminate(&self, _pid: u32) -> Result<(), LaunchError> {
            Ok(())
        }

        fn is_alive(&self, _pid: u32) -> bool {
            false
        }
    }

    struct NoUsers;

    impl UserResolver for NoUsers {
        fn resolve(&self, _name: &str) -> Option<Identity> {
            None
        }
    }

    fn config() -> ServerConfig {
        ServerConfig {
            name: "alpha".into(),
            address: None,
            port: 27960,
            base_path: PathBuf::from("/srv/et"),
            home_path: PathBuf::from("/srv/home"),
            game_mod: Mod::Etjump,
            os_user: "et".into(),
            config_files: vec!["server.cfg".into(), "maps.cfg".into()],
            custom_executable: None,
        }
    }

    #[test]
    fn test_launch_args_order() {
        let args = launch_args(&config());
        assert_eq!(
            args.join(" "),
            "+set com_hunkmegs 128 +map oasis +set fs_game etjump \
             +exec server.cfg +exec maps.cfg +set net_port 27960 \
             +set fs_basepath /srv/et +set fs_homepath /srv/home"
        );
    }

    #[test]
    fn test_launch_args_with_address() {
        let mut config = config();
        config.address = Some("10.0.0.5".into());
        config.config_files.clear();
        let args = launch_args(&config);
        let joined = args.join(" ");
        assert!(joined.contains("+set net_port 27960 +set net_ip 10.0.0.5 +set fs_basepath"));
        assert!(!joined.contains("+exec"));
    }

    #[tokio::test]
    async fn test_unknown_names_leave_no_lock_slots() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(DaemonConfig {
            registry_path: dir.path().join("servers.json"),
            ..DaemonConfig::default()
        });
        let registry = spawn_registry(RegistryStore::new(&config.registry_path)).unwrap();
        let coordinator =
            ServerCoordinator::new(registry, Arc::new(Unreachable), Arc::new(NoUsers), config);

        for i in 0..200 {
            let name = format!("ghost-{i}");
            let expected = Err(Failure::NotFound(name.clone()));
            assert_eq!(coordinator.start_server(&name).await, expected);
            assert_eq!(coordinator.stop_server(&name).await, expected);
            assert_eq!(coordinator.restart_server(&name).await, expected);
        }

        assert_eq!(coordinator.locks.tracked(), 0);
    }
}
