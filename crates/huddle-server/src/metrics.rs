//! Metrics collection and export.
//!
//! Instrumentation goes through the `metrics` facade; when the exporter is
//! enabled it is scraped in Prometheus format on its own port.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "huddle_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "huddle_connections_active";
    pub const MESSAGES_TOTAL: &str = "huddle_messages_total";
    pub const MESSAGES_BYTES: &str = "huddle_messages_bytes";
    pub const TOPICS_ACTIVE: &str = "huddle_topics_active";
    pub const SUBSCRIPTIONS_TOTAL: &str = "huddle_subscriptions_total";
    pub const JOINS_TOTAL: &str = "huddle_joins_total";
    pub const DELIVERIES_DROPPED: &str = "huddle_deliveries_dropped_total";
    pub const LATENCY_SECONDS: &str = "huddle_latency_seconds";
    pub const ERRORS_TOTAL: &str = "huddle_errors_total";
}

/// Describe every metric to the installed recorder.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of open connections"
    );
    metrics::describe_counter!(names::MESSAGES_TOTAL, "Frames processed, by direction");
    metrics::describe_counter!(names::MESSAGES_BYTES, "Frame bytes processed, by direction");
    metrics::describe_gauge!(names::TOPICS_ACTIVE, "Topics with at least one subscriber");
    metrics::describe_counter!(names::SUBSCRIPTIONS_TOTAL, "Accepted topic subscriptions");
    metrics::describe_counter!(names::JOINS_TOTAL, "Room join attempts, by outcome");
    metrics::describe_counter!(
        names::DELIVERIES_DROPPED,
        "Events dropped for slow subscribers"
    );
    metrics::describe_histogram!(
        names::LATENCY_SECONDS,
        "Inbound frame processing latency in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Errors, by kind");

    info!("Metrics initialized");
}

/// Install the Prometheus recorder and its HTTP listener.
///
/// # Errors
///
/// Returns an error if the recorder is already installed or the listener
/// cannot bind.
pub fn start_metrics_server(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame in the given direction (`inbound`, `outbound`).
pub fn record_message(bytes: usize, direction: &'static str) {
    counter!(names::MESSAGES_TOTAL, "direction" => direction).increment(1);
    counter!(names::MESSAGES_BYTES, "direction" => direction).increment(bytes as u64);
}

pub fn record_latency(seconds: f64) {
    histogram!(names::LATENCY_SECONDS).record(seconds);
}

pub fn record_subscription() {
    counter!(names::SUBSCRIPTIONS_TOTAL).increment(1);
}

/// Record a join attempt. `outcome` is `joined`, `already_member` or an
/// error code.
pub fn record_join(outcome: &'static str) {
    counter!(names::JOINS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_dropped(count: u64) {
    counter!(names::DELIVERIES_DROPPED).increment(count);
}

pub fn set_active_topics(count: usize) {
    gauge!(names::TOPICS_ACTIVE).set(count as f64);
}

pub fn record_error(kind: &'static str) {
    counter!(names::ERRORS_TOTAL, "kind" => kind).increment(1);
}

/// Guard that records a disconnection when the connection task ends.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}
