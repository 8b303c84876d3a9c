//! HTTP forwarder with bounded retry

use std::fmt;
use std::time::{Duration, Instant};

use serde_json::Value;

/// HTTP statuses the downstream uses to acknowledge a record
const SUCCESS_STATUSES: [u16; 3] = [200, 201, 202];

/// Configuration for the forwarder
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Downstream endpoint URL
    pub endpoint_url: String,

    /// Per-attempt HTTP timeout
    pub request_timeout: Duration,

    /// Total delivery attempts per record
    pub retry_attempts: u32,

    /// Backoff unit; attempt N sleeps N x this before the next try
    pub retry_base_delay: Duration,
}

impl ForwarderConfig {
    /// Create a config with default timeouts and retry policy
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        Self {
            endpoint_url: endpoint_url.into(),
            request_timeout: Duration::from_secs(10),
            retry_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the total attempt count
    #[must_use]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Set the backoff unit
    #[must_use]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}

/// Errors from forwarder construction
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// Failed to build the HTTP client
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Final classification of one record's delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    /// The downstream acknowledged the record (200/201/202)
    Delivered,

    /// The downstream responded with a non-success status; final, no retry
    Rejected(u16),

    /// No attempt ever got a response (refused, timeout, DNS failure)
    Unreachable,
}

impl ForwardOutcome {
    /// Whether the record reached the downstream successfully
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

impl fmt::Display for ForwardOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Delivered => write!(f, "delivered"),
            Self::Rejected(status) => write!(f, "rejected (HTTP {})", status),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// Forwards records to the configured downstream endpoint.
///
/// Holds one `reqwest::Client` (connection pooling across records) and is
/// shared across all connection handlers behind an `Arc`.
pub struct Forwarder {
    client: reqwest::Client,
    config: ForwarderConfig,
}

impl Forwarder {
    /// Create a forwarder; fails only if the HTTP client cannot be built
    pub fn new(config: ForwarderConfig) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// The configured endpoint URL
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint_url
    }

    /// Deliver one record.
    ///
    /// Serial per caller: retries and their backoff sleeps run inline, so a
    /// struggling downstream stalls only the calling connection.
    pub async fn forward(&self, record: &Value) -> ForwardOutcome {
        let attempts = self.config.retry_attempts.max(1);

        for attempt in 1..=attempts {
            let started = Instant::now();
            let result = self
                .client
                .post(&self.config.endpoint_url)
                .json(record)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let elapsed = started.elapsed();
                    if SUCCESS_STATUSES.contains(&status) {
                        tracing::trace!(attempt, status, ?elapsed, "record delivered");
                        return ForwardOutcome::Delivered;
                    }
                    // The downstream saw the record and declined it - final.
                    tracing::debug!(attempt, status, ?elapsed, "record rejected by endpoint");
                    return ForwardOutcome::Rejected(status);
                }
                Err(e) => {
                    tracing::debug!(
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        elapsed = ?started.elapsed(),
                        "forward attempt failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.retry_base_delay * attempt).await;
                    }
                }
            }
        }

        ForwardOutcome::Unreachable
    }
}
