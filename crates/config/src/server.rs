//! TCP listener configuration

use serde::Deserialize;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Listener configuration
///
/// # Example
///
/// ```toml
/// [server]
/// host = "0.0.0.0"
/// port = 12201
/// chunk_size = 8192
/// idle_timeout = "60s"
/// max_record_size = 1048576
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    /// Default: "0.0.0.0"
    pub host: String,

    /// Listen port
    /// Default: 12201 (GELF convention)
    pub port: u16,

    /// Socket read size per call (bytes)
    /// Default: 8192
    pub chunk_size: usize,

    /// Close a connection after this long without receiving data
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,

    /// Ceiling on one buffered record (bytes); exceeding it closes the
    /// connection
    /// Default: 1048576 (1 MiB)
    pub max_record_size: usize,

    /// Optional cap on concurrent connections
    /// Default: unset (OS limits only)
    pub max_connections: Option<usize>,

    /// Enable TCP keepalive on accepted connections
    /// Default: true
    pub keepalive: bool,

    /// Enable TCP_NODELAY on accepted connections
    /// Default: true
    pub nodelay: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 12201,
            chunk_size: 8192,
            idle_timeout: Duration::from_secs(60),
            max_record_size: 1024 * 1024,
            max_connections: None,
            keepalive: true,
            nodelay: true,
        }
    }
}

impl ServerConfig {
    /// Get the socket address to bind to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate listener settings
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ConfigError::invalid_value(
                "server",
                "chunk_size",
                "must be nonzero",
            ));
        }
        if self.max_record_size == 0 {
            return Err(ConfigError::invalid_value(
                "server",
                "max_record_size",
                "must be nonzero",
            ));
        }
        if self.max_connections == Some(0) {
            return Err(ConfigError::invalid_value(
                "server",
                "max_connections",
                "must be nonzero when set",
            ));
        }
        Ok(())
    }
}
