//! keepup Session - Detached process sessions for managed game servers
//!
//! This crate owns everything that touches the host's process table:
//! - `identity`: resolving an OS user name into uid, gid and home directory
//! - `launcher`: the [`ProcessLauncher`] seam used by the coordinator
//! - `tmux`: the production launcher backed by detached tmux sessions
//! - `process_tree`: locating the game process beneath a session's pane
//! - `signal`: liveness checks and termination via `kill(2)`

pub mod identity;
pub mod launcher;
pub mod process_tree;
pub mod signal;
pub mod tmux;

pub use identity::{Identity, SystemUsers, UserResolver};
pub use launcher::{LaunchError, LaunchSpec, ProcessLauncher};
pub use tmux::{escape_console_text, is_tmux_available, TmuxLauncher};
