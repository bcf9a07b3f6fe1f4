use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, Encoder, Histogram, IntCounter, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    // Query metrics
    pub static ref QUERIES_TOTAL: IntCounter = register_int_counter!(
        "importer_queries_total",
        "Total number of metrics queries issued"
    ).unwrap();

    pub static ref QUERY_FAILURES: IntCounter = register_int_counter!(
        "importer_query_failures_total",
        "Total number of metrics queries that failed"
    ).unwrap();

    pub static ref QUERY_DURATION: Histogram = register_histogram!(
        "importer_query_duration_seconds",
        "Metrics query duration in seconds",
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]
    ).unwrap();

    // Output metrics
    pub static ref ROWS_EMITTED: IntCounter = register_int_counter!(
        "importer_rows_emitted_total",
        "Total number of output rows produced"
    ).unwrap();

    pub static ref FIELD_COLLISIONS: IntCounter = register_int_counter!(
        "importer_field_collisions_total",
        "Metric values dropped because the output field already existed"
    ).unwrap();
}

/// Counts a query on creation and records its latency when dropped.
pub struct QueryTimer {
    start: Instant,
}

impl QueryTimer {
    pub fn new() -> Self {
        QUERIES_TOTAL.inc();
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for QueryTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for QueryTimer {
    fn drop(&mut self) {
        QUERY_DURATION.observe(self.start.elapsed().as_secs_f64());
    }
}

pub fn record_query_failure() {
    QUERY_FAILURES.inc();
}

pub fn record_rows_emitted(count: usize) {
    ROWS_EMITTED.inc_by(count as u64);
}

pub fn record_field_collision() {
    FIELD_COLLISIONS.inc();
}

/// Renders every registered collector in the Prometheus text format.
pub fn gather_text() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
