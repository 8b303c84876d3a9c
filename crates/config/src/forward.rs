//! Downstream HTTP forwarding configuration

use serde::Deserialize;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Forwarding configuration
///
/// `endpoint_url` is the only required setting in the whole config -
/// there is no sensible default destination for log records.
///
/// # Example
///
/// ```toml
/// [forward]
/// endpoint_url = "https://logs.example.com/ingest"
/// request_timeout = "10s"
/// retry_attempts = 3
/// retry_base_delay = "1s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Downstream HTTP endpoint (required, no default)
    pub endpoint_url: Option<String>,

    /// Per-attempt HTTP timeout
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Total delivery attempts per record (network failures only)
    /// Default: 3
    pub retry_attempts: u32,

    /// Backoff unit; attempt N sleeps N x this before the next try
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub retry_base_delay: Duration,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            endpoint_url: None,
            request_timeout: Duration::from_secs(10),
            retry_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

impl ForwardConfig {
    /// Get the endpoint URL, or the validation error for its absence
    pub fn require_endpoint(&self) -> Result<&str> {
        match self.endpoint_url.as_deref() {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(ConfigError::missing_field("forward", "endpoint_url")),
        }
    }

    /// Validate forwarding settings
    pub fn validate(&self) -> Result<()> {
        let url = self.require_endpoint()?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::invalid_value(
                "forward",
                "endpoint_url",
                format!("'{}' is not an http(s) URL", url),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(ConfigError::invalid_value(
                "forward",
                "retry_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}
