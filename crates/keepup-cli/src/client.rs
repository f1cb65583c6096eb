//! Request/reply client for the keepup daemon.
//!
//! One connection carries any number of requests, strictly one at a time:
//! write a JSON line, read a JSON line, check the id.
//!
//! **Panic-Free Policy:** No `.unwrap()`, `.expect()` or `panic!()` outside tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use keepup_core::{ServerDraft, ServerPatch};
use keepup_protocol::{Command, Query, Request, Response};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{ClientError, Result};

/// Default time to wait for a reply. Stop waits out the server's grace
/// period, so this is generous.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Connected client.
pub struct DaemonClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    reply_timeout: Duration,
    counter: AtomicU64,
}

impl DaemonClient {
    /// Connects to the daemon. A leading `tcp://` is accepted.
    pub async fn connect(address: &str) -> Result<Self> {
        let address = address.strip_prefix("tcp://").unwrap_or(address);
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| ClientError::Connect {
                address: address.to_string(),
                source,
            })?;
        debug!(address, "Connected to daemon");

        let (reader, writer) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(reader),
            writer,
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            counter: AtomicU64::new(0),
        })
    }

    #[must_use]
    pub fn with_reply_timeout(mut self, reply_timeout: Duration) -> Self {
        self.reply_timeout = reply_timeout;
        self
    }

    /// Next request id, `<pid>-<counter>`.
    fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", std::process::id())
    }

    /// Sends one request and waits for its reply.
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        let mut line = serde_json::to_string(&request.to_wire())?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;

        let mut reply = String::new();
        let n = timeout(self.reply_timeout, self.reader.read_line(&mut reply))
            .await
            .map_err(|_| ClientError::Timeout)??;
        if n == 0 {
            return Err(ClientError::Closed);
        }

        let response: Response = serde_json::from_str(reply.trim_end())?;
        if response.id.as_deref() != Some(request.id.as_str()) {
            return Err(ClientError::IdMismatch {
                sent: request.id.clone(),
                received: response.id,
            });
        }
        debug!(id = %request.id, success = response.success, "Received reply");
        Ok(response)
    }

    pub async fn command(&mut self, command: Command) -> Result<Response> {
        let request = Request::command(self.next_id(), command);
        self.request(&request).await
    }

    pub async fn query(&mut self, query: Query) -> Result<Response> {
        let request = Request::query(self.next_id(), query);
        self.request(&request).await
    }

    pub async fn list(&mut self, names: Vec<String>) -> Result<Response> {
        self.query(Query::ListServers { names }).await
    }

    pub async fn status(&mut self, name: &str) -> Result<Response> {
        self.query(Query::ServerStatus {
            name: name.to_string(),
        })
        .await
    }

    pub async fn start(&mut self, name: &str) -> Result<Response> {
        self.command(Command::StartServer {
            name: name.to_string(),
        })
        .await
    }

    pub async fn stop(&mut self, name: &str) -> Result<Response> {
        self.command(Command::StopServer {
            name: name.to_string(),
        })
        .await
    }

    pub async fn restart(&mut self, name: &str) -> Result<Response> {
        self.command(Command::RestartServer {
            name: name.to_string(),
        })
        .await
    }

    pub async fn add(&mut self, server: ServerDraft) -> Result<Response> {
        self.command(Command::AddServer {
            server: Some(server),
        })
        .await
    }

    pub async fn delete(&mut self, name: &str) -> Result<Response> {
        self.command(Command::DeleteServer {
            name: name.to_string(),
        })
        .await
    }

    pub async fn edit(&mut self, name: &str, changes: ServerPatch) -> Result<Response> {
        self.command(Command::EditServer {
            name: name.to_string(),
            changes,
        })
        .await
    }
}
