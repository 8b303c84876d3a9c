//! Counter aggregation and windowed snapshots

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe relay counters with interval-based snapshot/reset.
///
/// Shared as an `Arc` across all connection handler tasks; increments use
/// relaxed atomics, window ownership is claimed with a compare-exchange so
/// concurrent dispatch paths produce exactly one snapshot per window.
#[derive(Debug)]
pub struct RelayMetrics {
    /// Records delivered downstream (windowed)
    processed: AtomicU64,

    /// Records that failed to parse or deliver (windowed)
    failed: AtomicU64,

    /// Connections accepted over the process lifetime (never reset)
    connections_handled: AtomicU64,

    /// Process start, the zero point for window arithmetic
    started: Instant,

    /// Window start as milliseconds since `started`
    window_started_ms: AtomicU64,

    /// Minimum window length before a snapshot is produced
    interval: Duration,
}

impl RelayMetrics {
    /// Create a new aggregator with the given reporting interval
    pub fn new(interval: Duration) -> Self {
        Self {
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            connections_handled: AtomicU64::new(0),
            started: Instant::now(),
            window_started_ms: AtomicU64::new(0),
            interval,
        }
    }

    /// Record a successfully delivered record
    #[inline]
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed record (parse failure, rejection or unreachable)
    #[inline]
    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted connection
    #[inline]
    pub fn connection_handled(&self) {
        self.connections_handled.fetch_add(1, Ordering::Relaxed);
    }

    /// Records delivered in the current window
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Records failed in the current window
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Connections accepted since process start
    pub fn connections_handled(&self) -> u64 {
        self.connections_handled.load(Ordering::Relaxed)
    }

    /// Take a snapshot if the reporting interval has elapsed.
    ///
    /// Returns `None` inside the current window, or when another caller
    /// already claimed this window. On success the windowed counters are
    /// reset; `connections_handled` keeps accumulating.
    pub fn maybe_snapshot(&self) -> Option<MetricsSnapshot> {
        let now_ms = self.started.elapsed().as_millis() as u64;
        let window = self.window_started_ms.load(Ordering::Acquire);
        let elapsed_ms = now_ms.saturating_sub(window);
        if elapsed_ms < self.interval.as_millis() as u64 {
            return None;
        }

        // One winner per window boundary.
        if self
            .window_started_ms
            .compare_exchange(window, now_ms, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }

        Some(self.take_snapshot(elapsed_ms))
    }

    /// Take a snapshot unconditionally (shutdown reporting)
    pub fn final_snapshot(&self) -> MetricsSnapshot {
        let now_ms = self.started.elapsed().as_millis() as u64;
        let window = self.window_started_ms.swap(now_ms, Ordering::AcqRel);
        self.take_snapshot(now_ms.saturating_sub(window))
    }

    fn take_snapshot(&self, elapsed_ms: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            processed: self.processed.swap(0, Ordering::AcqRel),
            failed: self.failed.swap(0, Ordering::AcqRel),
            connections_handled: self.connections_handled.load(Ordering::Relaxed),
            elapsed: Duration::from_millis(elapsed_ms),
        }
    }
}

/// Point-in-time snapshot of one reporting window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Records delivered during the window
    pub processed: u64,

    /// Records failed during the window
    pub failed: u64,

    /// Connections accepted since process start (cumulative)
    pub connections_handled: u64,

    /// Window length
    pub elapsed: Duration,
}

impl MetricsSnapshot {
    /// Records delivered per second over the window
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Failed fraction of all records, as a percentage (0.0 with no traffic)
    pub fn failure_rate(&self) -> f64 {
        let total = self.processed + self.failed;
        if total > 0 {
            (self.failed as f64 / total as f64) * 100.0
        } else {
            0.0
        }
    }
}
