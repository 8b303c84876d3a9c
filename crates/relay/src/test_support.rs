//! Shared helpers for relay tests

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use relay_forward::{Forwarder, ForwarderConfig};
use relay_metrics::RelayMetrics;

use crate::dispatch::Dispatcher;

/// Spawn a loopback HTTP server answering every request with `status`.
/// Request bodies are sent to the returned channel in arrival order.
pub async fn spawn_http_server(status: u16) -> (SocketAddr, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut tmp = [0u8; 1024];

                let (body_start, content_length) = loop {
                    let Ok(n) = stream.read(&mut tmp).await else {
                        return;
                    };
                    if n == 0 {
                        return;
                    }
                    buf.extend_from_slice(&tmp[..n]);
                    if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                        let head = String::from_utf8_lossy(&buf[..pos]).to_string();
                        let content_length = head
                            .lines()
                            .find_map(|line| {
                                let (name, value) = line.split_once(':')?;
                                name.eq_ignore_ascii_case("content-length")
                                    .then(|| value.trim().parse::<usize>().ok())?
                            })
                            .unwrap_or(0);
                        break (pos + 4, content_length);
                    }
                };

                while buf.len() < body_start + content_length {
                    let Ok(n) = stream.read(&mut tmp).await else {
                        return;
                    };
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&tmp[..n]);
                }
                let end = (body_start + content_length).min(buf.len());
                let body = String::from_utf8_lossy(&buf[body_start..end]).to_string();
                let _ = tx.send(body);

                let response = format!(
                    "HTTP/1.1 {} Relay Test\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    (addr, rx)
}

/// Build a dispatcher pointed at `addr` with fast-failing retry settings
pub fn dispatcher_for(addr: SocketAddr) -> Arc<Dispatcher> {
    let forwarder = Forwarder::new(
        ForwarderConfig::new(format!("http://{}/ingest", addr))
            .with_request_timeout(Duration::from_secs(2))
            .with_retry_attempts(1)
            .with_retry_base_delay(Duration::from_millis(10)),
    )
    .unwrap();
    let metrics = Arc::new(RelayMetrics::new(Duration::from_secs(3600)));
    Arc::new(Dispatcher::new(forwarder, metrics, false))
}
