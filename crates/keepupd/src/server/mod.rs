//! TCP request/reply server for the keepup daemon.
//!
//! The server:
//! - Listens on a TCP address for client connections
//! - Spawns a ConnectionHandler for each client
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    RpcServer    │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌───────────────────┐     ┌───────────────────┐
//! │ConnectionHandler│────▶│ MessageDispatcher │────▶│ ServerCoordinator │
//! │   (per client)  │     │                   │     │                   │
//! └─────────────────┘     └───────────────────┘     └───────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Accept errors are logged and the server keeps running

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, MAX_MESSAGE_SIZE};

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::dispatcher::MessageDispatcher;

/// Request/reply server over newline-delimited JSON.
pub struct RpcServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    dispatcher: MessageDispatcher,
    cancel_token: CancellationToken,
    connection_counter: AtomicU64,
}

impl RpcServer {
    /// Binds the listening socket.
    ///
    /// Binding happens here rather than in `run` so callers learn about
    /// an unusable address before the daemon reports itself started.
    pub async fn bind(
        address: &str,
        dispatcher: MessageDispatcher,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|e| ServerError::Bind {
                address: address.to_string(),
                error: e.to_string(),
            })?;

        let local_addr = listener.local_addr().map_err(|e| ServerError::Bind {
            address: address.to_string(),
            error: e.to_string(),
        })?;

        Ok(Self {
            listener,
            local_addr,
            dispatcher,
            cancel_token,
            connection_counter: AtomicU64::new(0),
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accepts connections until the cancellation token is triggered.
    pub async fn run(&self) -> Result<(), ServerError> {
        info!(address = %self.local_addr, "RPC server listening");

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, conn_num);
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
            }
        }

        info!("Server stopped");
        Ok(())
    }

    fn handle_connection(
        &self,
        stream: tokio::net::TcpStream,
        peer: SocketAddr,
        connection_number: u64,
    ) {
        let (reader, writer) = stream.into_split();
        let handler = ConnectionHandler::new(
            reader,
            writer,
            self.dispatcher.clone(),
            self.cancel_token.clone(),
            peer,
            connection_number,
        );
        tokio::spawn(handler.run());
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {address}: {error}")]
    Bind { address: String, error: String },

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}
