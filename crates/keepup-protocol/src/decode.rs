//! Envelope validation and typed decoding.
//!
//! Validation runs in a fixed order and stops at the first problem, so a
//! client always sees the most fundamental error first:
//! JSON, id, message type, payload presence, payload discriminant, fields.

use keepup_core::{ServerDraft, ServerPatch};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::message::{Command, CommandKind, Message, MessageKind, Query, QueryKind, Request};

/// Why an inbound envelope was rejected. `Display` is the wire message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Message is not valid JSON.")]
    InvalidJson,

    #[error("Each message must have a unique id.")]
    MissingId,

    #[error("Message type must be specified and be between 0 and 1.")]
    InvalidMessageType,

    #[error("Command payload must be specified.")]
    MissingCommandPayload,

    #[error("Query payload must be specified.")]
    MissingQueryPayload,

    #[error("Invalid command type: {0}.")]
    InvalidCommandType(String),

    #[error("Invalid query type: {0}.")]
    InvalidQueryType(String),

    #[error("Server name must be specified.")]
    MissingName,

    #[error("Invalid {kind} payload: {reason}.")]
    InvalidPayload { kind: &'static str, reason: String },
}

/// A rejected request, with whatever id could be recovered for correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub id: Option<String>,
    pub error: ProtocolError,
}

impl Rejection {
    fn new(id: Option<String>, error: ProtocolError) -> Self {
        Self { id, error }
    }
}

// ============================================================================
// Payload shapes
// ============================================================================

#[derive(Deserialize)]
struct NamePayload {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Deserialize)]
struct AddPayload {
    #[serde(default)]
    server: Option<ServerDraft>,
}

#[derive(Deserialize)]
struct EditPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    changes: ServerPatch,
}

#[derive(Deserialize)]
struct ListPayload {
    #[serde(default, alias = "servers")]
    names: Option<Vec<String>>,
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes one raw request line into a typed [`Request`].
pub fn decode_request(raw: &str) -> Result<Request, Rejection> {
    let envelope: Value = serde_json::from_str(raw)
        .ok()
        .filter(Value::is_object)
        .ok_or_else(|| Rejection::new(None, ProtocolError::InvalidJson))?;

    let id = match envelope.get("id") {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(Rejection::new(None, ProtocolError::MissingId)),
    };

    let reject = |error: ProtocolError| Rejection::new(Some(id.clone()), error);

    let kind = envelope
        .get("type")
        .and_then(Value::as_u64)
        .and_then(|t| MessageKind::try_from(t).ok())
        .ok_or_else(|| reject(ProtocolError::InvalidMessageType))?;

    let payload = match envelope.get("payload") {
        Some(p @ Value::Object(_)) => p,
        _ => {
            return Err(reject(match kind {
                MessageKind::Command => ProtocolError::MissingCommandPayload,
                MessageKind::Query => ProtocolError::MissingQueryPayload,
            }))
        }
    };

    let message = match kind {
        MessageKind::Command => decode_command(payload).map(Message::Command),
        MessageKind::Query => decode_query(payload).map(Message::Query),
    }
    .map_err(reject)?;

    Ok(Request { id, message })
}

fn discriminant_text(payload: &Value) -> String {
    match payload.get("type") {
        Some(v) => v.to_string(),
        None => "missing".to_string(),
    }
}

fn decode_command(payload: &Value) -> Result<Command, ProtocolError> {
    let kind = payload
        .get("type")
        .and_then(Value::as_u64)
        .and_then(|t| CommandKind::try_from(t).ok())
        .ok_or_else(|| ProtocolError::InvalidCommandType(discriminant_text(payload)))?;

    let command = match kind {
        CommandKind::StartServer => Command::StartServer {
            name: required_name(payload, kind.as_str())?,
        },
        CommandKind::StopServer => Command::StopServer {
            name: required_name(payload, kind.as_str())?,
        },
        CommandKind::RestartServer => Command::RestartServer {
            name: required_name(payload, kind.as_str())?,
        },
        CommandKind::DeleteServer => Command::DeleteServer {
            name: required_name(payload, kind.as_str())?,
        },
        CommandKind::AddServer => {
            let add: AddPayload = fields(payload, kind.as_str())?;
            Command::AddServer { server: add.server }
        }
        CommandKind::EditServer => {
            let edit: EditPayload = fields(payload, kind.as_str())?;
            let name = non_empty(edit.name).ok_or(ProtocolError::MissingName)?;
            Command::EditServer {
                name,
                changes: edit.changes,
            }
        }
    };

    Ok(command)
}

fn decode_query(payload: &Value) -> Result<Query, ProtocolError> {
    let kind = payload
        .get("type")
        .and_then(Value::as_u64)
        .and_then(|t| QueryKind::try_from(t).ok())
        .ok_or_else(|| ProtocolError::InvalidQueryType(discriminant_text(payload)))?;

    let query = match kind {
        QueryKind::ListServers => {
            let list: ListPayload = fields(payload, kind.as_str())?;
            Query::ListServers {
                names: list.names.unwrap_or_default(),
            }
        }
        QueryKind::ServerStatus => Query::ServerStatus {
            name: required_name(payload, kind.as_str())?,
        },
    };

    Ok(query)
}

fn fields<T: for<'de> Deserialize<'de>>(
    payload: &Value,
    kind: &'static str,
) -> Result<T, ProtocolError> {
    T::deserialize(payload).map_err(|e| ProtocolError::InvalidPayload {
        kind,
        reason: e.to_string(),
    })
}

fn required_name(payload: &Value, kind: &'static str) -> Result<String, ProtocolError> {
    let named: NamePayload = fields(payload, kind)?;
    non_empty(named.name).ok_or(ProtocolError::MissingName)
}

fn non_empty(name: Option<String>) -> Option<String> {
    name.filter(|n| !n.trim().is_empty())
}
