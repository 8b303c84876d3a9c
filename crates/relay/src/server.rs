//! TCP listener and per-connection handling
//!
//! One task per connection. Each handler owns a [`FrameDecoder`] and loops
//! read / frame / dispatch; dispatch is awaited before the next read, so a
//! slow downstream backpressures only the connection that produced the
//! record.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use relay_config::ServerConfig;
use relay_protocol::{FrameDecoder, FrameError};

use crate::dispatch::Dispatcher;

/// Keepalive probing starts after this much idle time
const KEEPALIVE_TIME: Duration = Duration::from_secs(60);

/// Interval between keepalive probes
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the listen address
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// Why a connection handler exited
enum CloseReason {
    /// Clean EOF from the peer
    PeerClosed,

    /// No bytes arrived within the idle timeout
    IdleTimeout,

    /// The framer gave up on an oversized record
    Oversized(FrameError),

    /// Socket read failed
    ReadError(io::Error),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed"),
            Self::IdleTimeout => write!(f, "idle timeout"),
            Self::Oversized(e) => write!(f, "{}", e),
            Self::ReadError(e) => write!(f, "read error: {}", e),
        }
    }
}

/// GELF TCP listener.
///
/// Accepts connections until the cancellation token fires, then waits for
/// in-flight handlers to finish before returning.
pub struct RelayServer {
    config: ServerConfig,
    dispatcher: Arc<Dispatcher>,
    limiter: Option<Arc<Semaphore>>,
}

impl RelayServer {
    /// Create a server from the listen config and a shared dispatcher
    pub fn new(config: ServerConfig, dispatcher: Arc<Dispatcher>) -> Self {
        let limiter = config
            .max_connections
            .map(|cap| Arc::new(Semaphore::new(cap)));
        Self {
            config,
            dispatcher,
            limiter,
        }
    }

    /// Bind and serve until cancelled.
    ///
    /// A bind failure is fatal; everything after that point is handled per
    /// connection.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let address = self.config.bind_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| ServerError::Bind {
                address: address.clone(),
                source: e,
            })?;

        tracing::info!(%address, "listening for GELF senders");
        self.accept_loop(listener, cancel).await;
        Ok(())
    }

    async fn accept_loop(self, listener: TcpListener, cancel: CancellationToken) {
        let tracker = TaskTracker::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            self.spawn_connection(&tracker, stream, peer_addr);
                        }
                        Err(e) => {
                            // Transient accept errors - log and keep serving
                            tracing::warn!(error = %e, "accept error");
                        }
                    }
                }
            }
        }

        tracker.close();
        tracker.wait().await;
        tracing::info!("relay server stopped");
    }

    fn spawn_connection(&self, tracker: &TaskTracker, stream: TcpStream, peer_addr: SocketAddr) {
        let permit = match &self.limiter {
            Some(limiter) => match Arc::clone(limiter).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "connection limit reached, dropping connection");
                    return;
                }
            },
            None => None,
        };

        self.configure_socket(&stream);
        self.dispatcher.metrics().connection_handled();
        tracing::info!(peer = %peer_addr, "connection accepted");

        let handler = ConnectionHandler {
            chunk_size: self.config.chunk_size,
            idle_timeout: self.config.idle_timeout,
            max_record_size: self.config.max_record_size,
            dispatcher: Arc::clone(&self.dispatcher),
            peer_addr,
        };

        tracker.spawn(async move {
            handler.handle(stream).await;
            drop(permit);
        });
    }

    fn configure_socket(&self, stream: &TcpStream) {
        if self.config.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(error = %e, "failed to set TCP_NODELAY");
            }
        }
        if self.config.keepalive {
            let keepalive = TcpKeepalive::new()
                .with_time(KEEPALIVE_TIME)
                .with_interval(KEEPALIVE_INTERVAL);
            if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
                tracing::debug!(error = %e, "failed to set TCP keepalive");
            }
        }
    }
}

/// State for one accepted connection
struct ConnectionHandler {
    chunk_size: usize,
    idle_timeout: Duration,
    max_record_size: usize,
    dispatcher: Arc<Dispatcher>,
    peer_addr: SocketAddr,
}

impl ConnectionHandler {
    /// Read / frame / dispatch until the connection ends.
    ///
    /// Every read is wrapped in the idle timeout. After each chunk the framer
    /// is drained completely, so at most one partial record is buffered when
    /// the peer closes; partial bytes at EOF are dropped by design of the
    /// protocol (no delimiter means no way to finish them).
    async fn handle(&self, mut stream: TcpStream) {
        let mut decoder = FrameDecoder::new(self.max_record_size);
        let mut chunk = vec![0u8; self.chunk_size];

        let reason = loop {
            match tokio::time::timeout(self.idle_timeout, stream.read(&mut chunk)).await {
                Err(_) => break CloseReason::IdleTimeout,
                Ok(Ok(0)) => break CloseReason::PeerClosed,
                Ok(Ok(n)) => {
                    decoder.feed(&chunk[..n]);
                    if let Err(e) = self.drain(&mut decoder).await {
                        break CloseReason::Oversized(e);
                    }
                }
                Ok(Err(e)) => break CloseReason::ReadError(e),
            }
        };

        tracing::info!(
            peer = %self.peer_addr,
            reason = %reason,
            buffered = decoder.buffered(),
            discarded = decoder.discarded_bytes(),
            "connection closed"
        );
    }

    /// Dispatch every complete record currently buffered
    async fn drain(&self, decoder: &mut FrameDecoder) -> Result<(), FrameError> {
        while let Some(record) = decoder.next_record()? {
            self.dispatcher.dispatch(&record).await;
        }
        Ok(())
    }
}
