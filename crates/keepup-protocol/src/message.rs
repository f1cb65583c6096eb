//! Protocol message types for daemon communication.
//!
//! Requests travel as `{ "id", "type", "payload": { "type", ...fields } }`
//! where both `type` fields are integer discriminants. Responses are
//! `{ "id", "success", "message" }` plus optional result data.

use keepup_core::{Failure, ManagedServerRecord, Outcome, ServerDraft, ServerPatch};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::status::ServerStatus;

// ============================================================================
// Discriminants
// ============================================================================

/// Top-level message kind (`type` field of the envelope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Command = 0,
    Query = 1,
}

impl TryFrom<u64> for MessageKind {
    type Error = u64;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Command),
            1 => Ok(Self::Query),
            other => Err(other),
        }
    }
}

/// Command discriminant (`payload.type` when the message is a command).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    StartServer = 0,
    StopServer = 1,
    RestartServer = 2,
    AddServer = 3,
    DeleteServer = 4,
    EditServer = 5,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartServer => "StartServer",
            Self::StopServer => "StopServer",
            Self::RestartServer => "RestartServer",
            Self::AddServer => "AddServer",
            Self::DeleteServer => "DeleteServer",
            Self::EditServer => "EditServer",
        }
    }
}

impl TryFrom<u64> for CommandKind {
    type Error = u64;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::StartServer),
            1 => Ok(Self::StopServer),
            2 => Ok(Self::RestartServer),
            3 => Ok(Self::AddServer),
            4 => Ok(Self::DeleteServer),
            5 => Ok(Self::EditServer),
            other => Err(other),
        }
    }
}

/// Query discriminant (`payload.type` when the message is a query).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    ListServers = 0,
    ServerStatus = 1,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListServers => "ListServers",
            Self::ServerStatus => "ServerStatus",
        }
    }
}

impl TryFrom<u64> for QueryKind {
    type Error = u64;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ListServers),
            1 => Ok(Self::ServerStatus),
            other => Err(other),
        }
    }
}

// ============================================================================
// Typed messages
// ============================================================================

/// State-changing operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartServer { name: String },
    StopServer { name: String },
    RestartServer { name: String },
    /// `server` is `None` when the payload carried no server object;
    /// the coordinator reports that as a validation failure.
    AddServer { server: Option<ServerDraft> },
    DeleteServer { name: String },
    EditServer { name: String, changes: ServerPatch },
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::StartServer { .. } => CommandKind::StartServer,
            Self::StopServer { .. } => CommandKind::StopServer,
            Self::RestartServer { .. } => CommandKind::RestartServer,
            Self::AddServer { .. } => CommandKind::AddServer,
            Self::DeleteServer { .. } => CommandKind::DeleteServer,
            Self::EditServer { .. } => CommandKind::EditServer,
        }
    }

    fn payload(&self) -> Value {
        let mut fields = match self {
            Self::StartServer { name }
            | Self::StopServer { name }
            | Self::RestartServer { name }
            | Self::DeleteServer { name } => json!({ "name": name }),
            Self::AddServer { server } => json!({ "server": server }),
            Self::EditServer { name, changes } => {
                let mut v = serde_json::to_value(changes).unwrap_or_else(|_| json!({}));
                if let Some(map) = v.as_object_mut() {
                    map.insert("name".into(), Value::from(name.clone()));
                }
                v
            }
        };
        insert_type(&mut fields, self.kind() as u64);
        fields
    }
}

/// Read-only operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Lists every server when `names` is empty, otherwise only the named ones.
    ListServers { names: Vec<String> },
    /// Probes a managed server for its live status.
    ServerStatus { name: String },
}

impl Query {
    pub fn kind(&self) -> QueryKind {
        match self {
            Self::ListServers { .. } => QueryKind::ListServers,
            Self::ServerStatus { .. } => QueryKind::ServerStatus,
        }
    }

    fn payload(&self) -> Value {
        let mut fields = match self {
            Self::ListServers { names } => json!({ "names": names }),
            Self::ServerStatus { name } => json!({ "name": name }),
        };
        insert_type(&mut fields, self.kind() as u64);
        fields
    }
}

fn insert_type(fields: &mut Value, discriminant: u64) {
    if let Some(map) = fields.as_object_mut() {
        map.insert("type".into(), Value::from(discriminant));
    }
}

/// A decoded message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Command(Command),
    Query(Query),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Command(_) => MessageKind::Command,
            Self::Query(_) => MessageKind::Query,
        }
    }

    /// Short label for logs, e.g. `StartServer`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Command(c) => c.kind().as_str(),
            Self::Query(q) => q.kind().as_str(),
        }
    }
}

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Opaque correlation token echoed in the response.
    pub id: String,
    pub message: Message,
}

impl Request {
    pub fn new(id: impl Into<String>, message: Message) -> Self {
        Self {
            id: id.into(),
            message,
        }
    }

    pub fn command(id: impl Into<String>, command: Command) -> Self {
        Self::new(id, Message::Command(command))
    }

    pub fn query(id: impl Into<String>, query: Query) -> Self {
        Self::new(id, Message::Query(query))
    }

    /// Encodes the request in its wire form.
    pub fn to_wire(&self) -> Value {
        let payload = match &self.message {
            Message::Command(c) => c.payload(),
            Message::Query(q) => q.payload(),
        };
        let mut envelope = Map::new();
        envelope.insert("id".into(), Value::from(self.id.clone()));
        envelope.insert("type".into(), Value::from(self.message.kind() as u64));
        envelope.insert("payload".into(), payload);
        Value::Object(envelope)
    }
}

// ============================================================================
// Response
// ============================================================================

/// Reply sent for every request, correlated by `id`.
///
/// `id` is `null` when the request could not be parsed far enough to read one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: Option<String>,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<ManagedServerRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServerStatus>,
}

impl Response {
    pub fn success(id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            success: true,
            message: message.into(),
            servers: None,
            status: None,
        }
    }

    pub fn failure(id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            message: message.into(),
            servers: None,
            status: None,
        }
    }

    /// Builds a response from an operation outcome.
    ///
    /// `Failure::Internal` renders through its `Display`, which carries no detail.
    pub fn from_outcome(id: Option<String>, outcome: Outcome) -> Self {
        match outcome {
            Ok(message) => Self::success(id, message),
            Err(failure) => Self::from_failure(id, &failure),
        }
    }

    pub fn from_failure(id: Option<String>, failure: &Failure) -> Self {
        Self::failure(id, failure.to_string())
    }

    pub fn with_servers(mut self, servers: Vec<ManagedServerRecord>) -> Self {
        self.servers = Some(servers);
        self
    }

    pub fn with_status(mut self, status: ServerStatus) -> Self {
        self.status = Some(status);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = Request::command(
            "req-1",
            Command::StartServer {
                name: "alpha".into(),
            },
        );
        let wire = request.to_wire();
        assert_eq!(wire["id"], "req-1");
        assert_eq!(wire["type"], 0);
        assert_eq!(wire["payload"]["type"], 0);
        assert_eq!(wire["payload"]["name"], "alpha");
    }

    #[test]
    fn test_query_wire_shape() {
        let request = Request::query(
            "req-2",
            Query::ListServers {
                names: vec!["alpha".into()],
            },
        );
        let wire = request.to_wire();
        assert_eq!(wire["type"], 1);
        assert_eq!(wire["payload"]["type"], 0);
        assert_eq!(wire["payload"]["names"][0], "alpha");
    }

    #[test]
    fn test_edit_payload_flattens_changes() {
        let changes: ServerPatch = serde_json::from_value(json!({"port": 27970})).unwrap();
        let request = Request::command(
            "req-3",
            Command::EditServer {
                name: "alpha".into(),
                changes,
            },
        );
        let wire = request.to_wire();
        assert_eq!(wire["payload"]["type"], 5);
        assert_eq!(wire["payload"]["name"], "alpha");
        assert_eq!(wire["payload"]["port"], 27970);
    }

    #[test]
    fn test_discriminants() {
        assert_eq!(CommandKind::try_from(3), Ok(CommandKind::AddServer));
        assert_eq!(CommandKind::try_from(6), Err(6));
        assert_eq!(QueryKind::try_from(1), Ok(QueryKind::ServerStatus));
        assert_eq!(MessageKind::try_from(2), Err(2));
    }

    #[test]
    fn test_response_serialization() {
        let response = Response::success(Some("abc".into()), "Started server: alpha");
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"id\":\"abc\""));
        assert!(json.contains("\"success\":true"));
        assert!(!json.contains("servers"));
        assert!(!json.contains("status"));
    }

    #[test]
    fn test_response_null_id() {
        let response = Response::failure(None, "Message is not valid JSON.");
        let value = serde_json::to_value(&response).unwrap();
        assert!(value["id"].is_null());
        assert_eq!(value["success"], false);
    }

    #[test]
    fn test_internal_failure_is_generic_on_wire() {
        let response = Response::from_outcome(
            Some("x".into()),
            Err(Failure::internal("store at /var/lib/x: permission denied")),
        );
        assert_eq!(response.message, "Internal service error.");
        assert!(!response.success);
    }
}
