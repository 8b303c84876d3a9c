//! Relay metrics
//!
//! Process-wide counters shared by every connection handler:
//! records processed, records failed, connections handled.
//!
//! Reporting is opportunistic rather than timer-driven: any dispatch path
//! calls [`RelayMetrics::maybe_snapshot`] after updating counters, and the
//! first caller past the interval boundary wins the window, resets the
//! per-window counters and gets the snapshot to log. Metrics are
//! best-effort, so a quiet relay simply reports late.
//!
//! `connections_handled` is cumulative for the process lifetime and is
//! never reset - only `processed` and `failed` are windowed.

mod aggregator;

pub use aggregator::{MetricsSnapshot, RelayMetrics};

/// Default reporting interval in seconds
pub const DEFAULT_INTERVAL_SECS: u64 = 60;
