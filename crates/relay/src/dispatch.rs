//! Record dispatch
//!
//! Sits between the frame decoder and the forwarder: re-parses each framed
//! span into a JSON value, hands it to the forwarder, and accounts the
//! outcome. Dispatch is the natural place for metrics reporting too, since
//! every record passes through exactly once.

use std::sync::Arc;

use relay_forward::{ForwardOutcome, Forwarder};
use relay_metrics::{MetricsSnapshot, RelayMetrics};

/// What happened to one framed record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The span did not parse as JSON and was dropped before any HTTP work
    Invalid,

    /// The record went to the forwarder with this result
    Forwarded(ForwardOutcome),
}

/// Per-process dispatcher shared by all connection handlers.
///
/// Dispatch is serial per connection: the handler awaits each record before
/// framing the next one, so a slow downstream backpressures its own
/// connection without stalling the others.
pub struct Dispatcher {
    forwarder: Forwarder,
    metrics: Arc<RelayMetrics>,
    report_enabled: bool,
}

impl Dispatcher {
    /// Create a dispatcher over the given forwarder and counters
    pub fn new(forwarder: Forwarder, metrics: Arc<RelayMetrics>, report_enabled: bool) -> Self {
        Self {
            forwarder,
            metrics,
            report_enabled,
        }
    }

    /// The downstream endpoint records are forwarded to
    pub fn endpoint(&self) -> &str {
        self.forwarder.endpoint()
    }

    /// Shared relay counters
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    /// Deliver one framed record and account the result.
    ///
    /// A record that fails to parse is counted as failed and never reaches
    /// the network. Delivery failures are final here as well; the record is
    /// dropped after the forwarder gives up.
    pub async fn dispatch(&self, raw: &str) -> DispatchOutcome {
        let record: serde_json::Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                self.metrics.record_failed();
                tracing::debug!(error = %e, "dropping record that does not parse as JSON");
                self.maybe_report();
                return DispatchOutcome::Invalid;
            }
        };

        let started = std::time::Instant::now();
        let outcome = self.forwarder.forward(&record).await;
        tracing::trace!(%outcome, elapsed = ?started.elapsed(), "record forwarded");
        match outcome {
            ForwardOutcome::Delivered => {
                self.metrics.record_processed();
            }
            ForwardOutcome::Rejected(status) => {
                self.metrics.record_failed();
                tracing::warn!(status, "record rejected by endpoint, dropping");
            }
            ForwardOutcome::Unreachable => {
                self.metrics.record_failed();
                tracing::warn!(
                    endpoint = self.forwarder.endpoint(),
                    "endpoint unreachable, dropping record"
                );
            }
        }

        self.maybe_report();
        DispatchOutcome::Forwarded(outcome)
    }

    /// Emit a throughput report if the current window has elapsed.
    ///
    /// Checked opportunistically after each dispatch; the counters make sure
    /// only one concurrent caller wins each window.
    pub fn maybe_report(&self) {
        if !self.report_enabled {
            return;
        }
        if let Some(snapshot) = self.metrics.maybe_snapshot() {
            report(&snapshot, "relay throughput");
        }
    }

    /// Emit the closing report at shutdown
    pub fn report_final(&self) {
        report(&self.metrics.final_snapshot(), "final relay totals");
    }
}

fn report(snapshot: &MetricsSnapshot, message: &'static str) {
    tracing::info!(
        processed = snapshot.processed,
        failed = snapshot.failed,
        connections = snapshot.connections_handled,
        throughput = %format!("{:.2}/s", snapshot.throughput()),
        failure_rate = %format!("{:.2}%", snapshot.failure_rate()),
        window = ?snapshot.elapsed,
        "{}",
        message
    );
}
