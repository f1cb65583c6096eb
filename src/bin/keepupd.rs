//! keepup daemon - game server registry, watchdog and RPC service
//!
//! # Usage
//!
//! ```bash
//! # Start the daemon (foreground)
//! keepupd start
//!
//! # Start the daemon (background/daemonized)
//! keepupd start -d
//!
//! # Use a specific config file
//! keepupd --config /etc/keepup/config.toml start
//!
//! # Stop the daemon
//! keepupd stop
//!
//! # Check daemon status
//! keepupd status
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keepup_session::signal::{pid_alive, send_terminate};
use keepup_session::{is_tmux_available, SystemUsers, TmuxLauncher};
use keepupd::config::{self, DaemonConfig};
use keepup_core::ManagedServerRecord;
use keepupd::registry::{spawn_loaded_registry, RegistryStore};
use keepupd::{spawn_watchdog, MessageDispatcher, RpcServer, ServerCoordinator};

/// keepup daemon - keeps dedicated game servers running
#[derive(Parser, Debug)]
#[command(name = "keepupd", version, about)]
struct Args {
    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon
    Start {
        /// Run as a background daemon (fork to background)
        #[arg(short = 'd', long)]
        daemon: bool,
    },
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

fn pid_file_path() -> PathBuf {
    config::state_dir().join("keepupd.pid")
}

fn log_file_path() -> PathBuf {
    config::state_dir().join("keepupd.log")
}

fn read_pid() -> Option<u32> {
    let contents = fs::read_to_string(pid_file_path()).ok()?;
    contents.trim().parse().ok()
}

fn write_pid() -> Result<()> {
    let path = pid_file_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create state directory")?;
    }
    let mut file = File::create(&path).context("Failed to create PID file")?;
    write!(file, "{}", process::id()).context("Failed to write PID")?;
    Ok(())
}

fn remove_pid_file() {
    let _ = fs::remove_file(pid_file_path());
}

fn is_daemon_running() -> Option<u32> {
    if let Some(pid) = read_pid() {
        if pid_alive(pid) {
            return Some(pid);
        }
        remove_pid_file();
    }
    None
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = DaemonConfig::load(args.config.as_deref()).context("Failed to load config")?;

    let command = args.command.unwrap_or(Command::Start { daemon: false });

    match command {
        Command::Start { daemon } => {
            if let Some(pid) = is_daemon_running() {
                eprintln!("Daemon is already running (PID {pid})");
                eprintln!("Use 'keepupd stop' to stop it first.");
                process::exit(1);
            }

            // Fatal registry problems must reach the invoking shell.
            let records = load_registry(&config)?;

            if daemon {
                daemonize()?;
            }

            write_pid()?;

            let result = run_daemon(config, records);

            remove_pid_file();

            result
        }
        Command::Stop => {
            if let Some(pid) = is_daemon_running() {
                println!("Stopping daemon (PID {pid})...");
                send_terminate(pid).context("Failed to signal daemon")?;

                for _ in 0..50 {
                    if !pid_alive(pid) {
                        println!("Daemon stopped.");
                        return Ok(());
                    }
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }

                eprintln!("Daemon did not stop within 5 seconds.");
                process::exit(1);
            } else {
                println!("Daemon is not running.");
                Ok(())
            }
        }
        Command::Status => {
            if let Some(pid) = is_daemon_running() {
                println!("Daemon is running (PID {pid})");
                println!("Address:  {}", config.bind_address());
                println!("Registry: {}", config.registry_path.display());
                Ok(())
            } else {
                println!("Daemon is not running.");
                process::exit(1);
            }
        }
    }
}

fn load_registry(config: &DaemonConfig) -> Result<Vec<ManagedServerRecord>> {
    RegistryStore::new(&config.registry_path)
        .load()
        .with_context(|| {
            format!(
                "Failed to load server registry from {}",
                config.registry_path.display()
            )
        })
}

fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    Ok(EnvFilter::new("warn")
        .add_directive(format!("keepupd={level}").parse()?)
        .add_directive(format!("keepup_session={level}").parse()?)
        .add_directive(format!("keepup_protocol={level}").parse()?))
}

#[tokio::main]
async fn run_daemon(config: DaemonConfig, records: Vec<ManagedServerRecord>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.log_level)?)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "keepup daemon starting"
    );

    let config = Arc::new(config);
    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    if !is_tmux_available(&config.paths.tmux).await {
        warn!(tmux = %config.paths.tmux.display(), "tmux not found, servers cannot be started");
    }

    info!(
        path = %config.registry_path.display(),
        servers = records.len(),
        "Server registry loaded"
    );
    let registry = spawn_loaded_registry(RegistryStore::new(&config.registry_path), records);

    let coordinator = ServerCoordinator::new(
        registry,
        Arc::new(TmuxLauncher::new(config.paths.tmux.clone())),
        Arc::new(SystemUsers),
        Arc::clone(&config),
    );

    let server = RpcServer::bind(
        config.bind_address(),
        MessageDispatcher::new(coordinator.clone()),
        cancel_token.clone(),
    )
    .await?;

    let watchdog = spawn_watchdog(coordinator, config.watchdog_interval(), cancel_token.clone());

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        cancel_token.cancel();
        return Err(e.into());
    }

    let _ = watchdog.await;
    info!("keepup daemon stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
