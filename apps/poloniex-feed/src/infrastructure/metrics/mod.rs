//! Prometheus Metrics Module
//!
//! Counters for the feed session, exported in Prometheus format.
//!
//! # Metrics Categories
//!
//! - **Frames**: text frames read from the connection
//! - **Records**: decoded records by kind, routed or unmapped
//! - **Errors**: decode failures, sequence regressions, subscribe failures
//!
//! # Integration
//!
//! When a port is configured the exporter serves `/metrics` on its own
//! listener. Without [`init_metrics`] every recording call is a no-op.

use std::net::SocketAddr;
use std::sync::OnceLock;

use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the Prometheus recorder and HTTP listener.
///
/// A port of `0` disables the exporter. Repeated calls are ignored.
///
/// # Errors
///
/// Returns an error if the recorder or listener cannot be installed.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    if port == 0 || INSTALLED.get().is_some() {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()?;

    let _ = INSTALLED.set(());
    register_metrics();
    Ok(())
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "poloniex_feed_frames_received_total",
        "Total text frames read from the feed"
    );
    describe_counter!(
        "poloniex_feed_records_total",
        "Decoded records by kind and routing outcome"
    );
    describe_counter!(
        "poloniex_feed_decode_errors_total",
        "Frames or records that failed to decode, by error kind"
    );
    describe_counter!(
        "poloniex_feed_sequence_regressions_total",
        "Frames whose sequence number went backwards"
    );
    describe_counter!(
        "poloniex_feed_subscribe_failures_total",
        "Subscribe requests that could not be issued or were rejected"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Routing outcome label for records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Delivered to a configured instrument.
    Routed,
    /// Delivered to the unmapped sink.
    Unmapped,
}

impl RecordOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Routed => "routed",
            Self::Unmapped => "unmapped",
        }
    }
}

/// Record a text frame read from the connection.
pub fn record_frame_received() {
    counter!("poloniex_feed_frames_received_total").increment(1);
}

/// Record a delivered record.
pub fn record_record(kind: &'static str, outcome: RecordOutcome) {
    counter!(
        "poloniex_feed_records_total",
        "kind" => kind,
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a decode failure.
pub fn record_decode_error(kind: &'static str) {
    counter!("poloniex_feed_decode_errors_total", "kind" => kind).increment(1);
}

/// Record a sequence regression.
pub fn record_sequence_regression() {
    counter!("poloniex_feed_sequence_regressions_total").increment(1);
}

/// Record a subscribe failure.
pub fn record_subscribe_failure(reason: &'static str) {
    counter!("poloniex_feed_subscribe_failures_total", "reason" => reason).increment(1);
}
