//! keepup CLI - client library for the `keepup` command
//!
//! This crate provides:
//! - [`client`]: a request/reply connection to the daemon
//! - [`format`]: plain-text rendering of server lists and status replies
//! - [`error`]: client error types

pub mod client;
pub mod error;
pub mod format;

pub use client::{DaemonClient, DEFAULT_REPLY_TIMEOUT};
pub use error::{ClientError, Result};
pub use format::{format_servers, format_status, format_uptime};
