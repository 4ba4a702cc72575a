//! Prometheus metrics for the ingestion/aggregation pipeline.
//!
//! This module provides metrics for:
//! - WebSocket message throughput and processing latency per venue
//! - Reconnects, parse errors, and permanent connector stops
//! - Consolidation cycle count and latency
//! - Snapshot distribution to subscribers

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::venue::Venue;

// === Metric Name Constants ===

/// WebSocket messages received counter metric name.
pub const METRIC_WS_MESSAGES_RECEIVED: &str = "ws_messages_received_total";
/// WebSocket message processing latency metric name.
pub const METRIC_WS_MESSAGE_LATENCY: &str = "ws_message_latency_ms";
/// WebSocket reconnects counter metric name.
pub const METRIC_WS_RECONNECTS: &str = "ws_reconnects_total";
/// Parse errors counter metric name.
pub const METRIC_PARSE_ERRORS: &str = "parse_errors_total";
/// Permanently stopped connectors counter metric name.
pub const METRIC_CONNECTORS_STOPPED: &str = "connectors_stopped_total";
/// Consolidation cycles counter metric name.
pub const METRIC_CONSOLIDATION_CYCLES: &str = "consolidation_cycles_total";
/// Consolidation latency metric name.
pub const METRIC_CONSOLIDATION_LATENCY: &str = "consolidation_latency_ms";
/// Snapshots streamed to subscribers counter metric name.
pub const METRIC_SNAPSHOTS_STREAMED: &str = "snapshots_streamed_total";
/// Subscriber sessions opened counter metric name.
pub const METRIC_SUBSCRIBER_SESSIONS: &str = "subscriber_sessions_total";

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder and keep its handle for rendering.
///
/// Call once at startup, before any metric is emitted.
pub fn install_recorder() -> Result<(), BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle);
    Ok(())
}

/// Render the current metric registry in Prometheus exposition format.
///
/// Returns an empty string when no recorder is installed (tests).
pub fn render() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_counter!(
        METRIC_WS_MESSAGES_RECEIVED,
        "Total number of WebSocket messages received per venue"
    );
    describe_histogram!(
        METRIC_WS_MESSAGE_LATENCY,
        "WebSocket message processing latency in milliseconds"
    );
    describe_counter!(
        METRIC_WS_RECONNECTS,
        "Total number of WebSocket reconnections per venue"
    );
    describe_counter!(
        METRIC_PARSE_ERRORS,
        "Total number of discarded unparseable messages per venue"
    );
    describe_counter!(
        METRIC_CONNECTORS_STOPPED,
        "Total number of connectors stopped permanently"
    );
    describe_counter!(
        METRIC_CONSOLIDATION_CYCLES,
        "Total number of completed consolidation cycles"
    );
    describe_histogram!(
        METRIC_CONSOLIDATION_LATENCY,
        "Consolidated book rebuild latency in milliseconds"
    );
    describe_counter!(
        METRIC_SNAPSHOTS_STREAMED,
        "Total number of snapshots written to subscriber sessions"
    );
    describe_counter!(
        METRIC_SUBSCRIBER_SESSIONS,
        "Total number of subscriber sessions opened"
    );

    debug!("Metrics initialized");
}

/// Increment WebSocket messages received counter for a venue.
pub fn inc_ws_messages_received(venue: Venue) {
    counter!(METRIC_WS_MESSAGES_RECEIVED, "venue" => venue.to_string()).increment(1);
}

/// Record WebSocket message processing latency.
pub fn record_ws_message_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_WS_MESSAGE_LATENCY).record(latency_ms);
}

/// Increment WebSocket reconnects counter for a venue.
pub fn inc_ws_reconnects(venue: Venue) {
    counter!(METRIC_WS_RECONNECTS, "venue" => venue.to_string()).increment(1);
}

/// Increment parse errors counter for a venue.
pub fn inc_parse_errors(venue: Venue) {
    counter!(METRIC_PARSE_ERRORS, "venue" => venue.to_string()).increment(1);
}

/// Increment stopped connectors counter for a venue.
pub fn inc_connectors_stopped(venue: Venue) {
    counter!(METRIC_CONNECTORS_STOPPED, "venue" => venue.to_string()).increment(1);
}

/// Increment the consolidation cycle counter.
pub fn inc_consolidation_cycles() {
    counter!(METRIC_CONSOLIDATION_CYCLES).increment(1);
}

/// Record consolidation rebuild latency.
pub fn record_consolidation_latency(start: Instant) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_CONSOLIDATION_LATENCY).record(latency_ms);
}

/// Increment the snapshots streamed counter.
pub fn inc_snapshots_streamed() {
    counter!(METRIC_SNAPSHOTS_STREAMED).increment(1);
}

/// Increment the subscriber sessions counter.
pub fn inc_subscriber_sessions() {
    counter!(METRIC_SUBSCRIBER_SESSIONS).increment(1);
}
