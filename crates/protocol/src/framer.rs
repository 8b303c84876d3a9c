//! Incremental GELF frame decoder
//!
//! Extraction walks the buffer one record at a time:
//!
//! 1. Scan for the first `{`. Everything before it can never start a record
//!    and is discarded (this is the documented lossy policy for non-JSON
//!    noise - it keeps the buffer from growing without bound).
//! 2. Probe the buffer from that position with the stream deserializer.
//!    A complete object is emitted and its bytes consumed; trailing bytes
//!    stay buffered for the next extraction. A truncated object leaves the
//!    buffer untouched until more input arrives. Anything else is
//!    unrecoverable by waiting, so the buffer is discarded to resynchronize.
//! 3. If the buffer grows past `max_record_size` while still incomplete, it
//!    is cleared and the error surfaces to the connection handler.

use bytes::{Buf, BytesMut};
use serde::de::IgnoredAny;

use crate::{FrameError, Result, DEFAULT_MAX_RECORD_SIZE};

/// Outcome of probing the buffer for one leading JSON object.
///
/// `serde_json`'s native error does not separate these cases cleanly for a
/// caller, so the probe folds them into an explicit three-way result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    /// A complete object ends at this byte offset; anything after it is
    /// trailing input for the next extraction.
    Complete(usize),
    /// The input is a valid prefix of an object - wait for more bytes.
    Incomplete,
    /// The input can never parse, no matter what arrives later.
    Malformed,
}

/// Probe `input` for exactly one leading JSON value.
fn probe(input: &[u8]) -> Probe {
    let mut stream = serde_json::Deserializer::from_slice(input).into_iter::<IgnoredAny>();
    match stream.next() {
        Some(Ok(_)) => Probe::Complete(stream.byte_offset()),
        Some(Err(e)) if e.is_eof() => Probe::Incomplete,
        Some(Err(_)) => Probe::Malformed,
        None => Probe::Incomplete,
    }
}

/// Per-connection incremental framer for concatenated JSON records.
///
/// Feed raw socket chunks with [`feed`](Self::feed), then drain complete
/// records by calling [`next_record`](Self::next_record) until it returns
/// `Ok(None)`. After draining, the buffer holds either nothing or exactly
/// one partial record - never a complete unconsumed object.
#[derive(Debug)]
pub struct FrameDecoder {
    /// Unconsumed input for this connection
    buf: BytesMut,

    /// Ceiling on buffered bytes while waiting for a record to complete
    max_record_size: usize,

    /// Total bytes dropped by the lossy resync policy
    discarded_bytes: u64,
}

impl FrameDecoder {
    /// Create a decoder with the given record-size ceiling
    pub fn new(max_record_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_record_size,
            discarded_bytes: 0,
        }
    }

    /// Append a raw chunk to the decode buffer
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Extract the next complete record, if one is buffered.
    ///
    /// Returns `Ok(None)` when the buffer is drained (empty or holding one
    /// partial record). Returns [`FrameError::RecordTooLarge`] when the
    /// buffer exceeded the ceiling without completing a record; the buffer
    /// is cleared and the caller should close the connection.
    pub fn next_record(&mut self) -> Result<Option<String>> {
        loop {
            let start = match self.buf.iter().position(|&b| b == b'{') {
                Some(start) => start,
                None => {
                    // No frame start anywhere - nothing here can ever
                    // become a record.
                    if !self.buf.is_empty() {
                        self.discard(self.buf.len(), "no frame start");
                    }
                    return Ok(None);
                }
            };
            if start > 0 {
                self.discard(start, "leading noise");
            }

            match probe(&self.buf) {
                Probe::Complete(end) => {
                    let record = self.buf.split_to(end);
                    match std::str::from_utf8(&record) {
                        Ok(text) => return Ok(Some(text.to_owned())),
                        Err(_) => {
                            // Parsed as JSON but not valid UTF-8 as a span;
                            // treat like malformed input and keep going.
                            self.discarded_bytes += end as u64;
                            tracing::debug!(bytes = end, "discarded non-UTF-8 record span");
                        }
                    }
                }
                Probe::Incomplete => {
                    if self.buf.len() > self.max_record_size {
                        let size = self.buf.len();
                        self.buf.clear();
                        return Err(FrameError::record_too_large(size, self.max_record_size));
                    }
                    return Ok(None);
                }
                Probe::Malformed => {
                    // Unrecoverable by waiting - drop everything buffered so
                    // the connection does not stay wedged on corrupt input.
                    self.discard(self.buf.len(), "malformed record");
                    return Ok(None);
                }
            }
        }
    }

    /// Bytes currently buffered (zero or one partial record after draining)
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes dropped by the resynchronization policy
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes
    }

    fn discard(&mut self, len: usize, reason: &'static str) {
        self.discarded_bytes += len as u64;
        tracing::debug!(bytes = len, reason, "discarded unframeable bytes");
        self.buf.advance(len);
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RECORD_SIZE)
    }
}
