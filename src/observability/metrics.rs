//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_total` (counter): accepted client connections
//! - `proxy_active_connections` (gauge): connections being handled
//! - `proxy_requests_total` (counter): framed requests by `kind` (relay, tunnel)
//! - `proxy_errors_total` (counter): failed connections by error `kind`
//! - `proxy_bytes_total` (counter): relayed bytes by `direction`
//!
//! Without an installed recorder every call is a no-op.

use std::fmt;
use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Direction of relayed bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client → target.
    Upstream,
    /// Target → client.
    Downstream,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Upstream => "upstream",
            Direction::Downstream => "downstream",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn connection_opened() {
    counter!("proxy_connections_total").increment(1);
    gauge!("proxy_active_connections").increment(1.0);
}

pub fn connection_closed() {
    gauge!("proxy_active_connections").decrement(1.0);
}

pub fn record_request(kind: &'static str) {
    counter!("proxy_requests_total", "kind" => kind).increment(1);
}

pub fn record_error(kind: &'static str) {
    counter!("proxy_errors_total", "kind" => kind).increment(1);
}

pub fn record_bytes(direction: Direction, bytes: u64) {
    if bytes > 0 {
        counter!("proxy_bytes_total", "direction" => direction.as_str()).increment(bytes);
    }
}
