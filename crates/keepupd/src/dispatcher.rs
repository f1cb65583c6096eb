//! Message dispatcher - routes decoded requests to the coordinator.
//!
//! Each handler runs in its own task so a panic inside it is contained and
//! reported as a generic internal error. The client never sees internal
//! detail; it is logged here instead.

use keepup_core::{Failure, Outcome};
use keepup_protocol::{decode_request, Command, Message, Query, Request, Response};
use tracing::{debug, error, info, warn};

use crate::coordinator::ServerCoordinator;

/// Validates, decodes and routes requests.
#[derive(Clone)]
pub struct MessageDispatcher {
    coordinator: ServerCoordinator,
}

impl MessageDispatcher {
    pub fn new(coordinator: ServerCoordinator) -> Self {
        Self { coordinator }
    }

    /// Handles one raw request line. Always yields exactly one response.
    pub async fn dispatch_raw(&self, raw: &str) -> Response {
        match decode_request(raw) {
            Ok(request) => self.dispatch(request).await,
            Err(rejection) => {
                info!(id = ?rejection.id, reason = %rejection.error, "Rejected request");
                Response::failure(rejection.id, rejection.error.to_string())
            }
        }
    }

    /// Routes an already decoded request.
    pub async fn dispatch(&self, request: Request) -> Response {
        let id = request.id.clone();
        let label = request.message.label();
        debug!(id = %id, message = label, "Dispatching request");

        let coordinator = self.coordinator.clone();
        let task = tokio::spawn(route(coordinator, request));

        let response = match task.await {
            Ok(response) => response,
            Err(e) => {
                error!(id = %id, message = label, error = %e, "Request handler failed");
                Response::from_failure(Some(id), &Failure::internal(e))
            }
        };

        if response.success {
            info!(id = ?response.id, message = label, "Successful request");
        } else {
            info!(id = ?response.id, message = label, reason = %response.message, "Failed request");
        }
        response
    }
}

async fn route(coordinator: ServerCoordinator, request: Request) -> Response {
    let id = Some(request.id);

    match request.message {
        Message::Command(command) => {
            let outcome = match command {
                Command::StartServer { name } => coordinator.start_server(&name).await,
                Command::StopServer { name } => coordinator.stop_server(&name).await,
                Command::RestartServer { name } => coordinator.restart_server(&name).await,
                Command::AddServer { server } => coordinator.add_server(server).await,
                Command::DeleteServer { name } => coordinator.delete_server(&name).await,
                Command::EditServer { name, changes } => {
                    coordinator.edit_server(&name, &changes).await
                }
            };
            respond(id, outcome)
        }
        Message::Query(Query::ListServers { names }) => {
            let servers = coordinator.list_servers(&names).await;
            Response::success(id, format!("{} server(s)", servers.len())).with_servers(servers)
        }
        Message::Query(Query::ServerStatus { name }) => {
            match coordinator.server_status(&name).await {
                Ok(status) => {
                    let message = status.hostname().unwrap_or_else(|| name.clone());
                    Response::success(id, message).with_status(status)
                }
                Err(failure) => respond(id, Err(failure)),
            }
        }
    }
}

fn respond(id: Option<String>, outcome: Outcome) -> Response {
    match &outcome {
        Err(Failure::Internal(detail)) => {
            warn!(id = ?id, kind = "internal", detail = %detail, "Internal error while handling request");
        }
        Err(failure) => debug!(id = ?id, kind = failure.kind(), "Operation refused"),
        Ok(_) => {}
    }
    Response::from_outcome(id, outcome)
}
