//! keepup Protocol - Wire protocols for daemon communication
//!
//! This crate provides:
//! - `message`: the RPC envelope (request/response) between the CLI and the daemon
//! - `decode`: envelope validation and typed decoding of inbound requests
//! - `status`: the out-of-band status probe spoken by the game servers themselves

pub mod decode;
pub mod message;
pub mod status;

pub use decode::{decode_request, ProtocolError, Rejection};
pub use message::{Command, CommandKind, Message, MessageKind, Query, QueryKind, Request, Response};
pub use status::{
    parse_status_response, strip_colors, ServerStatus, StatusParseError, STATUS_REQUEST,
};
