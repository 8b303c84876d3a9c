//! End-to-end tests for the TCP listener
//!
//! Each test runs a real relay server on a loopback port plus the stub HTTP
//! endpoint from `test_support`, then drives it with raw TCP writes the way
//! a GELF sender would.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use relay_config::ServerConfig;

use crate::dispatch::Dispatcher;
use crate::server::RelayServer;
use crate::test_support::{dispatcher_for, spawn_http_server};

struct TestRelay {
    addr: SocketAddr,
    bodies: mpsc::UnboundedReceiver<String>,
    dispatcher: Arc<Dispatcher>,
    cancel: CancellationToken,
    server: tokio::task::JoinHandle<()>,
}

async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

async fn start_relay(mut config: ServerConfig) -> TestRelay {
    let (endpoint_addr, bodies) = spawn_http_server(200).await;
    let dispatcher = dispatcher_for(endpoint_addr);

    config.host = "127.0.0.1".into();
    config.port = free_port().await;
    let addr: SocketAddr = config.bind_address().parse().unwrap();

    let cancel = CancellationToken::new();
    let server = RelayServer::new(config, Arc::clone(&dispatcher));
    let server = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            server.run(cancel).await.unwrap();
        }
    });

    // Wait for the listener to come up, then give the server a moment to
    // notice the probe connection closing so it does not hold a permit.
    for _ in 0..50 {
        if TcpStream::connect(addr).await.is_ok() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    sleep(Duration::from_millis(50)).await;

    TestRelay {
        addr,
        bodies,
        dispatcher,
        cancel,
        server,
    }
}

fn fast_config() -> ServerConfig {
    ServerConfig {
        idle_timeout: Duration::from_secs(5),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_two_records_in_one_write_arrive_in_order() {
    let mut relay = start_relay(fast_config()).await;

    let mut sender = TcpStream::connect(relay.addr).await.unwrap();
    sender.write_all(br#"{"a":1}{"b":2}"#).await.unwrap();

    assert_eq!(relay.bodies.recv().await.unwrap(), r#"{"a":1}"#);
    assert_eq!(relay.bodies.recv().await.unwrap(), r#"{"b":2}"#);

    relay.cancel.cancel();
    relay.server.await.unwrap();
}

#[tokio::test]
async fn test_record_fragmented_across_writes() {
    let mut relay = start_relay(fast_config()).await;

    let mut sender = TcpStream::connect(relay.addr).await.unwrap();
    sender.write_all(br#"{"short_message":"#).await.unwrap();
    sleep(Duration::from_millis(50)).await;
    sender.write_all(br#""split"}"#).await.unwrap();

    assert_eq!(
        relay.bodies.recv().await.unwrap(),
        r#"{"short_message":"split"}"#
    );

    relay.cancel.cancel();
    relay.server.await.unwrap();
}

#[tokio::test]
async fn test_malformed_input_resyncs_to_later_records() {
    let mut relay = start_relay(fast_config()).await;

    let mut sender = TcpStream::connect(relay.addr).await.unwrap();
    // The malformed object poisons the whole buffered chunk; records that
    // arrive afterwards still go through on the same connection.
    sender.write_all(br#"{"broken":}"#).await.unwrap();
    sleep(Duration::from_millis(100)).await;
    sender.write_all(br#"{"ok":true}"#).await.unwrap();

    assert_eq!(relay.bodies.recv().await.unwrap(), r#"{"ok":true}"#);

    relay.cancel.cancel();
    relay.server.await.unwrap();
}

#[tokio::test]
async fn test_leading_noise_is_skipped() {
    let mut relay = start_relay(fast_config()).await;

    let mut sender = TcpStream::connect(relay.addr).await.unwrap();
    sender.write_all(br#"  garbage  {"a":1}"#).await.unwrap();

    assert_eq!(relay.bodies.recv().await.unwrap(), r#"{"a":1}"#);

    relay.cancel.cancel();
    relay.server.await.unwrap();
}

#[tokio::test]
async fn test_idle_connection_closed_by_server() {
    let config = ServerConfig {
        idle_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let relay = start_relay(config).await;

    let mut sender = TcpStream::connect(relay.addr).await.unwrap();
    let mut buf = [0u8; 16];
    // The server closes the socket after the idle timeout; we see EOF.
    let read = tokio::time::timeout(Duration::from_secs(2), sender.read(&mut buf)).await;
    assert!(matches!(read, Ok(Ok(0)) | Ok(Err(_))));

    relay.cancel.cancel();
    relay.server.await.unwrap();
}

#[tokio::test]
async fn test_oversized_record_closes_connection() {
    let config = ServerConfig {
        max_record_size: 64,
        idle_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let relay = start_relay(config).await;

    let mut sender = TcpStream::connect(relay.addr).await.unwrap();
    let mut oversized = br#"{"padding":""#.to_vec();
    oversized.extend(std::iter::repeat(b'a').take(200));
    sender.write_all(&oversized).await.unwrap();

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), sender.read(&mut buf)).await;
    assert!(matches!(read, Ok(Ok(0)) | Ok(Err(_))));

    relay.cancel.cancel();
    relay.server.await.unwrap();
}

#[tokio::test]
async fn test_connection_cap_drops_excess_connections() {
    let config = ServerConfig {
        max_connections: Some(1),
        idle_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let mut relay = start_relay(config).await;

    let mut first = TcpStream::connect(relay.addr).await.unwrap();
    first.write_all(br#"{"a":1}"#).await.unwrap();
    assert_eq!(relay.bodies.recv().await.unwrap(), r#"{"a":1}"#);

    // The second connection is over the cap and gets dropped on accept.
    let mut second = TcpStream::connect(relay.addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), second.read(&mut buf)).await;
    assert!(matches!(read, Ok(Ok(0)) | Ok(Err(_))));

    // The first connection keeps working.
    first.write_all(br#"{"b":2}"#).await.unwrap();
    assert_eq!(relay.bodies.recv().await.unwrap(), r#"{"b":2}"#);

    relay.cancel.cancel();
    relay.server.await.unwrap();
}

#[tokio::test]
async fn test_connections_are_counted() {
    let mut relay = start_relay(fast_config()).await;

    let mut sender = TcpStream::connect(relay.addr).await.unwrap();
    sender.write_all(br#"{"a":1}"#).await.unwrap();
    assert_eq!(relay.bodies.recv().await.unwrap(), r#"{"a":1}"#);

    // start_relay probes the port once to wait for the listener, so the
    // count includes that connection too.
    assert!(relay.dispatcher.metrics().connections_handled() >= 2);
    assert_eq!(relay.dispatcher.metrics().processed(), 1);

    relay.cancel.cancel();
    relay.server.await.unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_records() {
    let mut relay = start_relay(fast_config()).await;

    let mut sender = TcpStream::connect(relay.addr).await.unwrap();
    sender.write_all(br#"{"last":"one"}"#).await.unwrap();
    assert_eq!(relay.bodies.recv().await.unwrap(), r#"{"last":"one"}"#);

    drop(sender);
    relay.cancel.cancel();
    // run() returns only after the tracker drained all handler tasks.
    tokio::time::timeout(Duration::from_secs(2), relay.server)
        .await
        .unwrap()
        .unwrap();
}
