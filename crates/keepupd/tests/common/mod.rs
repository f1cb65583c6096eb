//! Shared fixtures for keepupd integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keepup_core::{ManagedServerRecord, ServerDraft};
use keepup_session::{Identity, LaunchError, LaunchSpec, ProcessLauncher, UserResolver};
use keepupd::config::DaemonConfig;
use keepupd::registry::{spawn_registry, RegistryHandle, RegistryStore};
use keepupd::ServerCoordinator;
use tempfile::TempDir;

// ============================================================================
// Fake launcher
// ============================================================================

#[derive(Default)]
struct LauncherState {
    next_pid: u32,
    alive: HashSet<u32>,
    sessions: HashMap<String, u32>,
    spawns: Vec<LaunchSpec>,
    injected: Vec<(String, String)>,
    terminated: Vec<u32>,
    spawn_dead: bool,
    fail_spawn: bool,
    quit_kills: bool,
}

/// In-memory process table standing in for tmux and `kill(2)`.
pub struct FakeLauncher {
    state: Mutex<LauncherState>,
    // Kept outside `state` so the panic does not poison it.
    panic_on_spawn: AtomicBool,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(LauncherState {
                next_pid: 1000,
                quit_kills: true,
                ..LauncherState::default()
            }),
            panic_on_spawn: AtomicBool::new(false),
        })
    }

    /// Spawned processes die immediately.
    pub fn set_spawn_dead(&self, dead: bool) {
        self.state.lock().unwrap().spawn_dead = dead;
    }

    /// Spawning fails outright.
    pub fn set_fail_spawn(&self, fail: bool) {
        self.state.lock().unwrap().fail_spawn = fail;
    }

    /// Spawning panics, as a buggy launcher would.
    pub fn set_panic_on_spawn(&self, panic: bool) {
        self.panic_on_spawn.store(panic, Ordering::SeqCst);
    }

    /// Whether the quit command makes the process exit.
    pub fn set_quit_kills(&self, kills: bool) {
        self.state.lock().unwrap().quit_kills = kills;
    }

    /// Simulates a crash.
    pub fn kill(&self, pid: u32) {
        self.state.lock().unwrap().alive.remove(&pid);
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().spawns.len()
    }

    pub fn last_spawn(&self) -> Option<LaunchSpec> {
        self.state.lock().unwrap().spawns.last().cloned()
    }

    pub fn injected(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().injected.clone()
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.state.lock().unwrap().terminated.clone()
    }
}

#[async_trait]
impl ProcessLauncher for FakeLauncher {
    async fn spawn(&self, spec: &LaunchSpec) -> Result<u32, LaunchError> {
        if self.panic_on_spawn.load(Ordering::SeqCst) {
            panic!("launcher blew up spawning {}", spec.session);
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_spawn {
            return Err(LaunchError::CommandFailed {
                command: "tmux new-session",
                status: "exit status: 1".into(),
                stderr: "duplicate session".into(),
            });
        }

        state.next_pid += 1;
        let pid = state.next_pid;
        if !state.spawn_dead {
            state.alive.insert(pid);
        }
        state.sessions.insert(spec.session.clone(), pid);
        state.spawns.push(spec.clone());
        Ok(pid)
    }

    async fn inject(
        &self,
        session: &str,
        text: &str,
        _identity: &Identity,
    ) -> Result<(), LaunchError> {
        let mut state = self.state.lock().unwrap();
        state.injected.push((session.to_string(), text.to_string()));
        if state.quit_kills && text == "quit" {
            if let Some(pid) = state.sessions.get(session).copied() {
                state.alive.remove(&pid);
            }
        }
        Ok(())
    }

    fn terminate(&self, pid: u32) -> Result<(), LaunchError> {
        let mut state = self.state.lock().unwrap();
        state.alive.remove(&pid);
        state.terminated.push(pid);
        Ok(())
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().unwrap().alive.contains(&pid)
    }
}

// ============================================================================
// Fake users
// ============================================================================

/// Knows exactly one user, `et`.
pub struct FakeUsers;

impl UserResolver for FakeUsers {
    fn resolve(&self, name: &str) -> Option<Identity> {
        (name == "et").then(|| Identity {
            name: "et".into(),
            uid: 1500,
            gid: 1500,
            home: PathBuf::from("/home/et"),
        })
    }
}

// ============================================================================
// Coordinator fixture
// ============================================================================

pub struct Fixture {
    pub dir: TempDir,
    pub launcher: Arc<FakeLauncher>,
    pub registry: RegistryHandle,
    pub coordinator: ServerCoordinator,
    pub config: Arc<DaemonConfig>,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(tweak: impl FnOnce(&mut DaemonConfig)) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir(dir.path().join("base")).unwrap();
        std::fs::create_dir(dir.path().join("home")).unwrap();

        let mut config = DaemonConfig {
            registry_path: dir.path().join("servers.json"),
            stop_grace_ms: 10,
            probe_timeout_ms: 200,
            address: "127.0.0.1:0".into(),
            ..DaemonConfig::default()
        };
        tweak(&mut config);
        let config = Arc::new(config);

        let registry = spawn_registry(RegistryStore::new(&config.registry_path)).unwrap();
        let launcher = FakeLauncher::new();
        let coordinator = ServerCoordinator::new(
            registry.clone(),
            launcher.clone(),
            Arc::new(FakeUsers),
            Arc::clone(&config),
        );

        Self {
            dir,
            launcher,
            registry,
            coordinator,
            config,
        }
    }

    pub fn base(&self) -> PathBuf {
        self.dir.path().join("base")
    }

    pub fn home(&self) -> PathBuf {
        self.dir.path().join("home")
    }

    /// A draft that passes every validation step.
    pub fn draft(&self, name: &str, port: u16) -> ServerDraft {
        ServerDraft {
            name: Some(name.into()),
            port: Some(serde_json::Value::from(port)),
            base_path: Some(self.base()),
            home_path: Some(self.home()),
            game_mod: Some("etjump".into()),
            os_user: Some("et".into()),
            config_files: Some(vec![]),
            ..ServerDraft::default()
        }
    }

    pub async fn record(&self, name: &str) -> ManagedServerRecord {
        self.registry.get(name).await.expect("record exists")
    }

    /// Adds and starts a server, returning its pid.
    pub async fn running(&self, name: &str, port: u16) -> u32 {
        self.coordinator
            .add_server(Some(self.draft(name, port)))
            .await
            .unwrap();
        self.coordinator.start_server(name).await.unwrap();
        self.record(name).await.process_id.unwrap()
    }

    pub fn registry_bytes(&self) -> Vec<u8> {
        std::fs::read(&self.config.registry_path).unwrap_or_default()
    }
}
