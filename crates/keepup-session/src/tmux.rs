//! Detached tmux sessions as the production [`ProcessLauncher`].
//!
//! Every command runs with the target user's uid and gid, so each user
//! gets their own tmux server and sessions stay invisible to other users.

use std::path::{Path, PathBuf};
use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::identity::Identity;
use crate::launcher::{LaunchError, LaunchSpec, ProcessLauncher};
use crate::process_tree::find_program_pid;
use crate::signal::{pid_alive, send_terminate};

/// Launches servers in detached tmux sessions.
#[derive(Debug, Clone)]
pub struct TmuxLauncher {
    tmux: PathBuf,
}

impl TmuxLauncher {
    /// Creates a launcher using the given tmux binary.
    pub fn new(tmux: impl Into<PathBuf>) -> Self {
        Self { tmux: tmux.into() }
    }

    fn command(&self, identity: &Identity) -> Command {
        let mut cmd = Command::new(&self.tmux);
        cmd.uid(identity.uid)
            .gid(identity.gid)
            .env("HOME", &identity.home)
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, what: &'static str) -> Result<Output, LaunchError> {
        let output = cmd.output().await.map_err(|source| LaunchError::Spawn {
            program: self.tmux.display().to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(LaunchError::CommandFailed {
                command: what,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(output)
    }
}

impl Default for TmuxLauncher {
    fn default() -> Self {
        Self::new("tmux")
    }
}

#[async_trait]
impl ProcessLauncher for TmuxLauncher {
    async fn spawn(&self, spec: &LaunchSpec) -> Result<u32, LaunchError> {
        let mut cmd = self.command(&spec.identity);
        cmd.current_dir(&spec.working_dir)
            .args(["new-session", "-d", "-P", "-F", "#{pane_pid}", "-s"])
            .arg(&spec.session)
            .arg("--")
            .arg(&spec.program)
            .args(&spec.args);

        debug!(
            session = %spec.session,
            program = %spec.program.display(),
            user = %spec.identity.name,
            "Starting tmux session"
        );

        let output = self.run(cmd, "tmux new-session").await?;
        let pane_pid = parse_pane_pid(&output.stdout)?;

        let program = spec.program.clone();
        let pid = tokio::task::spawn_blocking(move || find_program_pid(pane_pid, &program))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, pane_pid, "Process tree search failed, using pane pid");
                pane_pid
            });

        debug!(session = %spec.session, pane_pid, pid, "Session started");
        Ok(pid)
    }

    async fn inject(
        &self,
        session: &str,
        text: &str,
        identity: &Identity,
    ) -> Result<(), LaunchError> {
        let mut cmd = self.command(identity);
        cmd.args(["send-keys", "-t", session, "-l"])
            .arg(escape_console_text(text));
        self.run(cmd, "tmux send-keys").await?;

        let mut enter = self.command(identity);
        enter.args(["send-keys", "-t", session, "Enter"]);
        self.run(enter, "tmux send-keys").await?;

        debug!(session, text, "Injected console text");
        Ok(())
    }

    fn terminate(&self, pid: u32) -> Result<(), LaunchError> {
        send_terminate(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        pid_alive(pid)
    }
}

fn parse_pane_pid(stdout: &[u8]) -> Result<u32, LaunchError> {
    let text = String::from_utf8_lossy(stdout);
    let trimmed = text.trim();
    trimmed
        .parse::<u32>()
        .ok()
        .filter(|pid| *pid > 0)
        .ok_or_else(|| LaunchError::BadPanePid(trimmed.to_string()))
}

/// Restricts text to what is safe to type into a server console.
///
/// Keeps printable ASCII except `"`, `;` and `\`, which the console would
/// treat as quoting, command separators or escapes.
pub fn escape_console_text(text: &str) -> String {
    text.chars()
        .filter(|c| matches!(c, ' '..='~') && !matches!(c, '"' | ';' | '\\'))
        .collect()
}

/// Returns true if the tmux binary runs.
pub async fn is_tmux_available(tmux: &Path) -> bool {
    Command::new(tmux)
        .arg("-V")
        .output()
        .await
        .map(|o| o.status.success())
        .unwrap_or(false)
}
