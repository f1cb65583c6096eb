//! keepup - command-line client for the keepup daemon
//!
//! # Usage
//!
//! ```text
//! keepup list                      # all managed servers
//! keepup start <name>              # start / stop / restart a server
//! keepup add --name trickjump --port 27960 --base-path /srv/et \
//!            --home-path /home/et/.etlegacy --mod etjump --user et
//! keepup status <name>             # live status via the daemon
//! keepup probe <host> [port]       # live status, without the daemon
//! ```

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use keepup_cli::{format_servers, format_status, DaemonClient};
use keepup_core::{ServerDraft, ServerPatch};
use keepup_protocol::Response;
use keepupd::config::DaemonConfig;
use keepupd::StatusProbe;

/// Default game server port.
const DEFAULT_GAME_PORT: u16 = 27960;

// ============================================================================
// CLI Arguments
// ============================================================================

/// keepup - manage dedicated game servers
#[derive(Parser, Debug)]
#[command(name = "keepup", version, about)]
struct Args {
    /// Daemon address (defaults to the configured address)
    #[arg(long, global = true)]
    connect: Option<String>,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List managed servers
    List {
        /// Only these servers
        names: Vec<String>,
    },
    /// Start a server
    Start { name: String },
    /// Stop a server
    Stop { name: String },
    /// Restart a server
    Restart { name: String },
    /// Register a new server
    Add(ServerFields),
    /// Remove a server
    Delete { name: String },
    /// Change a server's settings
    Edit {
        name: String,
        #[command(flatten)]
        changes: PatchFields,
    },
    /// Query a managed server's live status
    Status { name: String },
    /// Query any server's live status directly
    Probe {
        host: String,
        #[arg(default_value_t = DEFAULT_GAME_PORT)]
        port: u16,
        /// Reply timeout in milliseconds
        #[arg(long, default_value_t = 1000)]
        timeout_ms: u64,
    },
}

#[derive(ClapArgs, Debug)]
struct ServerFields {
    #[arg(long)]
    name: String,
    #[arg(long)]
    port: u16,
    /// Address the server binds and is probed on
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    base_path: PathBuf,
    #[arg(long)]
    home_path: PathBuf,
    #[arg(long = "mod")]
    game_mod: String,
    /// OS user to run the server as
    #[arg(long)]
    user: String,
    /// Config file to exec at startup (repeatable)
    #[arg(long = "exec")]
    config_files: Vec<String>,
    #[arg(long)]
    executable: Option<PathBuf>,
}

impl From<ServerFields> for ServerDraft {
    fn from(f: ServerFields) -> Self {
        ServerDraft {
            name: Some(f.name),
            address: f.address,
            port: Some(Value::from(f.port)),
            base_path: Some(f.base_path),
            home_path: Some(f.home_path),
            game_mod: Some(f.game_mod),
            os_user: Some(f.user),
            config_files: Some(f.config_files),
            custom_executable: f.executable,
        }
    }
}

#[derive(ClapArgs, Debug)]
struct PatchFields {
    #[arg(long)]
    port: Option<u16>,
    #[arg(long)]
    address: Option<String>,
    #[arg(long)]
    base_path: Option<PathBuf>,
    #[arg(long)]
    home_path: Option<PathBuf>,
    #[arg(long = "mod")]
    game_mod: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long = "exec")]
    config_files: Option<Vec<String>>,
    #[arg(long)]
    executable: Option<PathBuf>,
}

impl From<PatchFields> for ServerPatch {
    fn from(f: PatchFields) -> Self {
        ServerPatch {
            address: f.address,
            port: f.port.map(Value::from),
            base_path: f.base_path,
            home_path: f.home_path,
            game_mod: f.game_mod,
            os_user: f.user,
            config_files: f.config_files,
            custom_executable: f.executable,
        }
    }
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(args) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("Error: {e:#}");
            process::exit(1);
        }
    }
}

/// Returns whether the operation succeeded.
#[tokio::main]
async fn run(args: Args) -> Result<bool> {
    if let Command::Probe {
        host,
        port,
        timeout_ms,
    } = &args.command
    {
        return probe(host, *port, Duration::from_millis(*timeout_ms)).await;
    }

    let address = match args.connect {
        Some(address) => address,
        None => {
            let config = DaemonConfig::load(args.config.as_deref())
                .context("Failed to load config")?;
            config.bind_address().to_string()
        }
    };

    let mut client = DaemonClient::connect(&address)
        .await
        .context("Is keepupd running? Start it with 'keepupd start -d'")?;

    let response = match args.command {
        Command::List { names } => client.list(names).await?,
        Command::Start { name } => client.start(&name).await?,
        Command::Stop { name } => client.stop(&name).await?,
        Command::Restart { name } => client.restart(&name).await?,
        Command::Add(fields) => client.add(fields.into()).await?,
        Command::Delete { name } => client.delete(&name).await?,
        Command::Edit { name, changes } => client.edit(&name, changes.into()).await?,
        Command::Status { name } => client.status(&name).await?,
        Command::Probe { .. } => return Ok(false),
    };

    Ok(print_response(response))
}

fn print_response(response: Response) -> bool {
    if !response.success {
        eprintln!("{}", response.message);
        return false;
    }

    if let Some(servers) = &response.servers {
        print!("{}", format_servers(servers, chrono::Utc::now()));
    } else if let Some(status) = &response.status {
        print!("{}", format_status(status));
    } else {
        println!("{}", response.message);
    }
    true
}

async fn probe(host: &str, port: u16, timeout: Duration) -> Result<bool> {
    match StatusProbe::new(timeout).status(host, port).await {
        Ok(status) => {
            print!("{}", format_status(&status));
            Ok(true)
        }
        Err(e) => {
            eprintln!("{}", keepup_core::Failure::from(e));
            Ok(false)
        }
    }
}
