//! keepup Core - Shared types for managed game servers
//!
//! This crate provides the domain types shared between
//! the daemon (keepupd), the wire protocol, and the CLI client.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod game_mod;
pub mod record;
pub mod server;

// Re-exports for convenience
pub use error::{Failure, Outcome};
pub use game_mod::Mod;
pub use record::{ManagedServerRecord, MAX_RESTART_ATTEMPTS, NOT_RUNNING};
pub use server::{
    parse_port, ServerConfig, ServerDraft, ServerPatch, DEFAULT_ADDRESS, PORT_RANGE_MESSAGE,
};
