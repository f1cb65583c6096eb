//! Integration tests for the TCP request/reply service.
//!
//! These run the full daemon stack (server, dispatcher, coordinator and
//! registry) with a fake launcher, talking newline-delimited JSON over a
//! real socket.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use common::Fixture;
use keepupd::{MessageDispatcher, RpcServer};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound on any single reply.
const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for server shutdown
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_millis(100);

// ============================================================================
// Test Helpers
// ============================================================================

/// A running daemon on an ephemeral port.
struct TestDaemon {
    fx: Fixture,
    addr: SocketAddr,
    cancel_token: CancellationToken,
}

impl TestDaemon {
    async fn spawn() -> Self {
        let fx = Fixture::new().await;
        let cancel_token = CancellationToken::new();
        let dispatcher = MessageDispatcher::new(fx.coordinator.clone());

        let server = RpcServer::bind("127.0.0.1:0", dispatcher, cancel_token.clone())
            .await
            .expect("bind rpc server");
        let addr = server.local_addr();

        tokio::spawn(async move {
            let _ = server.run().await;
        });

        Self {
            fx,
            addr,
            cancel_token,
        }
    }

    async fn connect(&self) -> TestClient {
        let stream = TcpStream::connect(self.addr).await.expect("connect to daemon");
        TestClient::new(stream)
    }

    async fn shutdown(self) {
        self.cancel_token.cancel();
        sleep(SHUTDOWN_GRACE_PERIOD).await;
    }
}

struct TestClient {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl TestClient {
    fn new(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let mut line = String::new();
        let n = timeout(REPLY_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("reply within timeout")
            .unwrap();
        assert!(n > 0, "connection closed before reply");
        serde_json::from_str(&line).expect("reply is JSON")
    }

    async fn request(&mut self, message: Value) -> Value {
        self.send_raw(&message.to_string()).await;
        self.recv().await
    }
}

fn command(id: &str, kind: u64, payload: Value) -> Value {
    let mut payload = payload;
    payload["type"] = json!(kind);
    json!({"id": id, "type": 0, "payload": payload})
}

fn query(id: &str, kind: u64, payload: Value) -> Value {
    let mut payload = payload;
    payload["type"] = json!(kind);
    json!({"id": id, "type": 1, "payload": payload})
}

fn add_payload(fx: &Fixture, name: &str, port: u16) -> Value {
    json!({
        "server": {
            "name": name,
            "port": port,
            "basePath": fx.base(),
            "homePath": fx.home(),
            "mod": "etjump",
            "osUser": "et",
            "configFiles": ["server.cfg"],
        }
    })
}

// ============================================================================
// Envelope errors
// ============================================================================

#[tokio::test]
async fn test_missing_id_is_rejected() {
    let daemon = TestDaemon::spawn().await;
    let mut client = daemon.connect().await;

    let reply = client
        .request(json!({"type": 0, "payload": {"type": 0, "name": "alpha"}}))
        .await;

    assert_eq!(reply["success"], false);
    assert_eq!(reply["message"], "Each message must have a unique id.");
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(daemon.fx.launcher.spawn_count(), 0);

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_invalid_json_gets_reply() {
    let daemon = TestDaemon::spawn().await;
    let mut client = daemon.connect().await;

    client.send_raw("{not json").await;
    let reply = client.recv().await;

    assert_eq!(reply["success"], false);
    assert_eq!(reply["id"], Value::Null);
    assert_eq!(reply["message"], "Message is not valid JSON.");

    // The connection stays usable.
    let reply = client.request(query("r2", 0, json!({}))).await;
    assert_eq!(reply["success"], true);

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_invalid_command_type() {
    let daemon = TestDaemon::spawn().await;
    let mut client = daemon.connect().await;

    let reply = client.request(command("r1", 42, json!({"name": "x"}))).await;
    assert_eq!(reply["id"], "r1");
    assert_eq!(reply["success"], false);
    assert_eq!(reply["message"], "Invalid command type: 42.");

    daemon.shutdown().await;
}

// ============================================================================
// Commands and queries
// ============================================================================

#[tokio::test]
async fn test_add_start_list_over_the_wire() {
    let daemon = TestDaemon::spawn().await;
    let mut client = daemon.connect().await;

    let reply = client
        .request(command("r1", 3, add_payload(&daemon.fx, "alpha", 27960)))
        .await;
    assert_eq!(reply["id"], "r1");
    assert_eq!(reply["success"], true, "{reply}");
    assert_eq!(reply["message"], "Server alpha added.");

    let reply = client
        .request(command("r2", 0, json!({"name": "alpha"})))
        .await;
    assert_eq!(reply["message"], "Started server: alpha");

    let reply = client.request(query("r3", 0, json!({}))).await;
    assert_eq!(reply["id"], "r3");
    assert_eq!(reply["success"], true);
    let servers = reply["servers"].as_array().unwrap();
    assert_eq!(servers.len(), 1);
    assert_eq!(servers[0]["name"], "alpha");
    assert_eq!(servers[0]["port"], 27960);
    assert!(servers[0]["processId"].as_u64().unwrap() > 0);

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_failure_replies_carry_request_id() {
    let daemon = TestDaemon::spawn().await;
    let mut client = daemon.connect().await;

    let reply = client
        .request(command("stop-1", 1, json!({"name": "doesnotexist"})))
        .await;
    assert_eq!(reply["id"], "stop-1");
    assert_eq!(reply["success"], false);
    assert_eq!(reply["message"], "Server doesnotexist does not exist.");

    let reply = client
        .request(command("add-1", 3, add_payload(&daemon.fx, "alpha", 500)))
        .await;
    assert_eq!(reply["id"], "add-1");
    assert!(reply["message"]
        .as_str()
        .unwrap()
        .contains("between 1024 and 65536"));

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_sequential_requests_on_one_connection() {
    let daemon = TestDaemon::spawn().await;
    let mut client = daemon.connect().await;

    for i in 0..5 {
        let id = format!("req-{i}");
        let reply = client.request(query(&id, 0, json!({}))).await;
        assert_eq!(reply["id"], id.as_str());
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_clients() {
    let daemon = TestDaemon::spawn().await;
    let mut a = daemon.connect().await;
    let mut b = daemon.connect().await;

    let (ra, rb) = tokio::join!(
        a.request(query("a", 0, json!({}))),
        b.request(query("b", 0, json!({})))
    );
    assert_eq!(ra["id"], "a");
    assert_eq!(rb["id"], "b");

    daemon.shutdown().await;
}

// ============================================================================
// Internal errors
// ============================================================================

#[tokio::test]
async fn test_handler_panic_reported_as_internal_error() {
    let daemon = TestDaemon::spawn().await;
    let mut client = daemon.connect().await;
    client
        .request(command("r1", 3, add_payload(&daemon.fx, "alpha", 27960)))
        .await;

    daemon.fx.launcher.set_panic_on_spawn(true);
    let reply = client
        .request(command("r2", 0, json!({"name": "alpha"})))
        .await;
    assert_eq!(reply["id"], "r2");
    assert_eq!(reply["success"], false);
    assert_eq!(reply["message"], "Internal service error.");

    // The connection and the lifecycle lock both survive the panic.
    daemon.fx.launcher.set_panic_on_spawn(false);
    let reply = client
        .request(command("r3", 0, json!({"name": "alpha"})))
        .await;
    assert_eq!(reply["id"], "r3");
    assert_eq!(reply["success"], true, "{reply}");

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_persist_failure_reported_as_internal_error() {
    let daemon = TestDaemon::spawn().await;
    let mut client = daemon.connect().await;
    client
        .request(command("r1", 3, add_payload(&daemon.fx, "alpha", 27960)))
        .await;

    // A non-empty directory in place of the registry file makes the
    // final rename fail, even for root.
    let path = daemon.fx.config.registry_path.clone();
    std::fs::remove_file(&path).unwrap();
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep"), "x").unwrap();

    let reply = client
        .request(command("r2", 0, json!({"name": "alpha"})))
        .await;
    assert_eq!(reply["id"], "r2");
    assert_eq!(reply["success"], false);
    assert_eq!(reply["message"], "Internal service error.");
    assert!(!reply.to_string().contains("registry"));

    let reply = client.request(query("r3", 0, json!({}))).await;
    assert_eq!(reply["id"], "r3");
    assert_eq!(reply["success"], true);

    daemon.shutdown().await;
}

// ============================================================================
// Status query
// ============================================================================

#[tokio::test]
async fn test_status_query_against_fake_server() {
    let daemon = TestDaemon::spawn().await;
    let game = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = game.local_addr().unwrap().port();

    tokio::spawn(async move {
        let mut buf = [0u8; 64];
        let (_, from) = game.recv_from(&mut buf).await.unwrap();
        let reply = b"\xFF\xFF\xFF\xFFstatusResponse\n\\sv_hostname\\^1My^7Server\\mapname\\oasis\n\"Alice\" 10 50\nEOT\n";
        game.send_to(reply, from).await.unwrap();
    });

    let mut client = daemon.connect().await;
    client
        .request(command("r1", 3, add_payload(&daemon.fx, "alpha", port)))
        .await;

    let reply = client
        .request(query("r2", 1, json!({"name": "alpha"})))
        .await;
    assert_eq!(reply["success"], true, "{reply}");
    assert_eq!(reply["message"], "MyServer");
    assert_eq!(reply["status"]["keys"]["mapname"], "oasis");
    assert_eq!(reply["status"]["players"][0], "Alice");

    daemon.shutdown().await;
}

#[tokio::test]
async fn test_status_query_timeout() {
    let daemon = TestDaemon::spawn().await;
    // Bound but silent.
    let game = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let port = game.local_addr().unwrap().port();

    let mut client = daemon.connect().await;
    client
        .request(command("r1", 3, add_payload(&daemon.fx, "alpha", port)))
        .await;

    let reply = client
        .request(query("r2", 1, json!({"name": "alpha"})))
        .await;
    assert_eq!(reply["success"], false);
    assert_eq!(
        reply["message"],
        format!("Could not reach server: 127.0.0.1:{port}")
    );

    drop(game);
    daemon.shutdown().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let daemon = TestDaemon::spawn().await;
    let mut client = daemon.connect().await;
    let addr = daemon.addr;

    daemon.shutdown().await;

    let mut line = String::new();
    let n = timeout(REPLY_TIMEOUT, client.reader.read_line(&mut line))
        .await
        .expect("connection closes after shutdown")
        .unwrap_or(0);
    assert_eq!(n, 0);

    assert!(TcpStream::connect(addr).await.is_err());
}
