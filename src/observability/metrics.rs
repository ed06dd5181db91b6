//! Metrics collection and exposition.
//!
//! # Metrics
//! - `fanout_requests_total` (counter): requests by response status
//! - `fanout_request_duration_seconds` (histogram): end-to-end latency
//! - `fanout_fetches_total` (counter): URL fetches by outcome
//! - `fanout_fetch_duration_seconds` (histogram): per-URL latency
//! - `fanout_active_connections` (gauge): connections holding a gate token
//! - `fanout_connections_total` (counter): connections admitted
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(status: u16, start: Instant) {
    let status = status.to_string();
    counter!("fanout_requests_total", "status" => status.clone()).increment(1);
    histogram!("fanout_request_duration_seconds", "status" => status)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_fetch(outcome: &'static str, start: Instant) {
    counter!("fanout_fetches_total", "outcome" => outcome).increment(1);
    histogram!("fanout_fetch_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_connection_opened() {
    counter!("fanout_connections_total").increment(1);
    gauge!("fanout_active_connections").increment(1.0);
}

pub fn record_connection_closed() {
    gauge!("fanout_active_connections").decrement(1.0);
}
