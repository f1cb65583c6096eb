//! Status probe client.
//!
//! Sends one `getstatus` datagram from an ephemeral socket and waits for
//! the reply under a hard deadline. Every call ends in exactly one outcome:
//! a parsed status, a transport error, a parse error, or a timeout.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use keepup_core::Failure;
use keepup_protocol::{parse_status_response, ServerStatus, StatusParseError, STATUS_REQUEST};
use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tokio::time::timeout;
use tracing::debug;

/// Default probe deadline.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Largest datagram accepted as a reply.
const MAX_REPLY_SIZE: usize = 65_507;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("could not resolve {address}: {source}")]
    Resolve {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("no address found for {0}")]
    NoAddress(String),

    #[error("socket error: {0}")]
    Transport(#[from] io::Error),

    #[error("no reply from {address}")]
    Timeout { address: String },

    #[error("malformed reply: {0}")]
    Parse(#[from] StatusParseError),
}

impl From<ProbeError> for Failure {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Timeout { address } => Failure::Unreachable { address },
            ProbeError::Parse(e) => Failure::Parse(e.to_string()),
            other => Failure::Transport(other.to_string()),
        }
    }
}

/// Queries game servers for their live status.
#[derive(Debug, Clone, Copy)]
pub struct StatusProbe {
    timeout: Duration,
}

impl StatusProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Probes `host:port` and parses the reply.
    ///
    /// The deadline covers name resolution, the send and the receive.
    pub async fn status(&self, host: &str, port: u16) -> Result<ServerStatus, ProbeError> {
        let display = format!("{host}:{port}");
        let reply = self.within(&display, exchange(host, port, &display)).await?;
        Ok(parse_status_response(&reply)?)
    }

    async fn within<T>(
        &self,
        address: &str,
        work: impl Future<Output = Result<T, ProbeError>>,
    ) -> Result<T, ProbeError> {
        timeout(self.timeout, work)
            .await
            .map_err(|_| ProbeError::Timeout {
                address: address.to_string(),
            })?
    }
}

/// Resolves the target, sends the request and waits for its reply.
async fn exchange(host: &str, port: u16, display: &str) -> Result<Vec<u8>, ProbeError> {
    let target = lookup_host((host, port))
        .await
        .map_err(|source| ProbeError::Resolve {
            address: display.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| ProbeError::NoAddress(display.to_string()))?;

    let bind = if target.is_ipv4() {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    } else {
        SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
    };
    let socket = UdpSocket::bind(bind).await?;
    socket.send_to(STATUS_REQUEST, target).await?;
    debug!(target = %target, "Sent status probe");

    let reply = receive_from(&socket, target).await?;
    debug!(target = %target, bytes = reply.len(), "Received status reply");
    Ok(reply)
}

impl Default for StatusProbe {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

/// Reads datagrams until one arrives from `target`.
async fn receive_from(socket: &UdpSocket, target: SocketAddr) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; MAX_REPLY_SIZE];
    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;
        if from == target {
            buf.truncate(len);
            return Ok(buf);
        }
        debug!(from = %from, "Ignoring datagram from unexpected peer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn test_probe_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, from) = server.recv_from(&mut buf).await.unwrap();
            assert_eq!(&buf[..len], STATUS_REQUEST);
            server
                .send_to(
                    b"\xFF\xFF\xFF\xFFstatusResponse\n\\sv_hostname\\^1Test\\sv_maxclients\\12\n0 0 \"Zed\"\n",
                    from,
                )
                .await
                .unwrap();
        });

        let status = StatusProbe::default().status("127.0.0.1", port).await.unwrap();
        assert_eq!(status.hostname().as_deref(), Some("Test"));
        assert_eq!(status.max_clients(), Some(12));
        assert_eq!(status.players, vec!["Zed"]);
    }

    #[tokio::test]
    async fn test_probe_timeout_is_bounded() {
        // Bound but silent socket, so nothing ever answers.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let probe = StatusProbe::new(Duration::from_millis(200));
        let started = Instant::now();
        let err = probe.status("127.0.0.1", port).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, ProbeError::Timeout { .. }));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(1500));

        let failure: Failure = err.into();
        assert_eq!(
            failure.to_string(),
            format!("Could not reach server: 127.0.0.1:{port}")
        );
    }

    #[tokio::test]
    async fn test_deadline_covers_slow_resolution() {
        let probe = StatusProbe::new(Duration::from_millis(100));
        let started = Instant::now();
        let stalled = std::future::pending::<Result<Vec<u8>, ProbeError>>();

        let err = probe.within("slow.example:27960", stalled).await.unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(1000));
        match err {
            ProbeError::Timeout { address } => assert_eq!(address, "slow.example:27960"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_maps_to_parse_failure() {
        let failure: Failure = ProbeError::Parse(StatusParseError::Empty).into();
        assert!(matches!(failure, Failure::Parse(_)));
    }
}
