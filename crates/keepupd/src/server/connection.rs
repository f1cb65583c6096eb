//! Connection handler for individual client connections.
//!
//! Requests on one connection are served strictly one at a time: read a
//! line, dispatch it, write the response, repeat. There is no pipelining,
//! so responses can never be reordered.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Connection errors are logged and result in graceful disconnect

use std::net::SocketAddr;
use std::time::Duration;

use keepup_protocol::Response;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::MessageDispatcher;

/// Maximum request size (1 MB)
pub const MAX_MESSAGE_SIZE: usize = 1_048_576;

/// Read timeout for idle connections (5 minutes)
const READ_TIMEOUT: Duration = Duration::from_secs(300);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves one client connection.
pub struct ConnectionHandler {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
    dispatcher: MessageDispatcher,
    cancel_token: CancellationToken,
    peer: SocketAddr,
    connection_number: u64,
}

impl ConnectionHandler {
    pub fn new(
        reader: OwnedReadHalf,
        writer: OwnedWriteHalf,
        dispatcher: MessageDispatcher,
        cancel_token: CancellationToken,
        peer: SocketAddr,
        connection_number: u64,
    ) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            dispatcher,
            cancel_token,
            peer,
            connection_number,
        }
    }

    /// Runs until the client disconnects, idles out, or shutdown begins.
    pub async fn run(mut self) {
        debug!(connection = self.connection_number, peer = %self.peer, "Client connected");

        if let Err(e) = self.process_requests().await {
            debug!(
                connection = self.connection_number,
                error = %e,
                "Connection closed"
            );
        }

        debug!(connection = self.connection_number, "Client disconnected");
    }

    async fn process_requests(&mut self) -> Result<(), ConnectionError> {
        loop {
            let cancel = self.cancel_token.clone();
            let read = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                read = timeout(READ_TIMEOUT, self.read_line()) => read,
            };

            let line = match read {
                Ok(Ok(line)) => line,
                Ok(Err(ConnectionError::Eof)) => return Ok(()),
                Ok(Err(ConnectionError::MessageTooLarge { size, max })) => {
                    warn!(connection = self.connection_number, size, "Request too large");
                    let response = Response::failure(None, "Message is too large.");
                    self.send_response(&response).await?;
                    return Err(ConnectionError::MessageTooLarge { size, max });
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => return Err(ConnectionError::Timeout),
            };

            if line.trim().is_empty() {
                continue;
            }

            let response = self.dispatcher.dispatch_raw(&line).await;
            self.send_response(&response).await?;
        }
    }

    async fn read_line(&mut self) -> Result<String, ConnectionError> {
        let mut line = String::new();

        let bytes_read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        if bytes_read == 0 {
            return Err(ConnectionError::Eof);
        }

        if line.len() > MAX_MESSAGE_SIZE {
            return Err(ConnectionError::MessageTooLarge {
                size: line.len(),
                max: MAX_MESSAGE_SIZE,
            });
        }

        Ok(line)
    }

    async fn send_response(&mut self, response: &Response) -> Result<(), ConnectionError> {
        let json =
            serde_json::to_string(response).map_err(|e| ConnectionError::Encode(e.to_string()))?;

        let writer = &mut self.writer;
        match timeout(WRITE_TIMEOUT, async {
            writer.write_all(json.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            Ok::<(), std::io::Error>(())
        })
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectionError::Io(e.to_string())),
            Err(_) => {
                info!(connection = self.connection_number, "Write timed out");
                Err(ConnectionError::WriteTimeout)
            }
        }
    }
}

/// Errors that can occur during connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Encode error: {0}")]
    Encode(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection closed")]
    Eof,

    #[error("Read timeout")]
    Timeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_size_error() {
        let err = ConnectionError::MessageTooLarge {
            size: 2_000_000,
            max: MAX_MESSAGE_SIZE,
        };
        assert!(err.to_string().contains("2000000"));
    }
}
