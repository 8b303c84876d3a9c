//! GELF stream framing
//!
//! GELF-over-TCP has no length prefix and no delimiter: producers write
//! concatenated JSON objects to the socket and record boundaries have to be
//! reconstructed from the byte stream itself. This crate provides the
//! [`FrameDecoder`], a per-connection incremental framer that accepts
//! arbitrarily fragmented chunks and emits complete JSON-object substrings.
//!
//! # Design
//!
//! - **Rolling buffer**: unconsumed input accumulates in a `bytes::BytesMut`
//!   that is bounded by `max_record_size`.
//! - **Parse-probe framing**: the only boundary signal is a successful JSON
//!   parse. A probe built on `serde_json`'s stream deserializer classifies
//!   the buffer as a complete object (with its end offset), a truncated
//!   prefix worth waiting on, or malformed input to resynchronize past.
//! - **Lossy resync**: bytes that cannot start a record (no `{` in sight, or
//!   a prefix that can never parse) are discarded so a corrupt producer
//!   cannot wedge the connection. Discards are counted and traced.
//!
//! # Example
//!
//! ```
//! use relay_protocol::FrameDecoder;
//!
//! let mut decoder = FrameDecoder::default();
//! decoder.feed(br#"{"version":"1.1","host":"a"}{"version":"1.1","#);
//!
//! assert_eq!(
//!     decoder.next_record().unwrap().as_deref(),
//!     Some(r#"{"version":"1.1","host":"a"}"#)
//! );
//! // Second object is still incomplete - wait for more input.
//! assert_eq!(decoder.next_record().unwrap(), None);
//! ```

mod error;
mod framer;

pub use error::FrameError;
pub use framer::FrameDecoder;

/// Result type for framing operations
pub type Result<T> = std::result::Result<T, FrameError>;

/// Default ceiling for a single buffered record (1 MiB)
pub const DEFAULT_MAX_RECORD_SIZE: usize = 1024 * 1024;
