//! Framing error types

use thiserror::Error;

/// Errors that can occur while framing a connection's byte stream
#[derive(Debug, Error)]
pub enum FrameError {
    /// The decode buffer exceeded the configured ceiling without ever
    /// yielding a complete record. Malformed or adversarial producer;
    /// the connection should be closed.
    #[error("buffered record size {size} exceeds limit {limit}")]
    RecordTooLarge { size: usize, limit: usize },
}

impl FrameError {
    /// Create a record-too-large error
    #[inline]
    pub fn record_too_large(size: usize, limit: usize) -> Self {
        Self::RecordTooLarge { size, limit }
    }
}
