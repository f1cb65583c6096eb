//! keepup Daemon - Managed game server registry, watchdog and RPC service
//!
//! This crate provides the core infrastructure for the keepup daemon:
//! - `config` - Daemon configuration loaded from TOML
//! - `registry` - Registry actor owning the persisted server records
//! - `coordinator` - Lifecycle operations (add, start, stop, restart, ...)
//! - `watchdog` - Periodic restart of servers that died unexpectedly
//! - `probe` - UDP status probe client
//! - `dispatcher` - Request decoding and routing
//! - `server` - TCP request/reply server
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          keepupd daemon                          │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ┌─────────────┐   ┌───────────────────┐   ┌──────────────────┐  │
//! │  │  RpcServer  │──▶│ MessageDispatcher │──▶│ServerCoordinator │  │
//! │  │   (TCP)     │   └───────────────────┘   └───┬──────┬───────┘  │
//! │  └─────────────┘                               │      │          │
//! │  ┌─────────────┐                               │      │          │
//! │  │  Watchdog   │───────────────────────────────┘      │          │
//! │  │  (interval) │                                      ▼          │
//! │  └─────────────┘        ┌───────────────┐   ┌──────────────────┐ │
//! │                         │ RegistryActor │◀──│ ProcessLauncher  │ │
//! │                         │ servers.json  │   │ UserResolver     │ │
//! │                         └───────────────┘   └──────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod locks;
pub mod probe;
pub mod registry;
pub mod server;
pub mod watchdog;

pub use config::DaemonConfig;
pub use coordinator::{ServerCoordinator, TickSummary};
pub use dispatcher::MessageDispatcher;
pub use probe::{ProbeError, StatusProbe};
pub use registry::{spawn_registry, RegistryHandle, RegistryStore};
pub use server::RpcServer;
pub use watchdog::spawn_watchdog;
