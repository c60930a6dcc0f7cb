//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_requests_total` (counter): routing decisions by `decision`
//! - `proxy_connections_active` (gauge): open client connections
//! - `proxy_tunnels_active` (gauge): live upgrade tunnels
//! - `proxy_tunnel_bytes_total` (counter): spliced bytes by `direction`
//! - `proxy_tunnel_duration_seconds` (histogram): tunnel lifetime
//! - `proxy_upgrade_failures_total` (counter): failed upgrades by `reason`
//! - `proxy_forward_duration_seconds` (histogram): forwarded request latency by `status`

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and start its HTTP listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_decision(decision: &'static str) {
    counter!("proxy_requests_total", "decision" => decision).increment(1);
}

pub fn connection_opened() {
    gauge!("proxy_connections_active").increment(1.0);
}

pub fn connection_closed() {
    gauge!("proxy_connections_active").decrement(1.0);
}

pub fn tunnel_opened() {
    gauge!("proxy_tunnels_active").increment(1.0);
}

pub fn tunnel_closed(client_to_backend: u64, backend_to_client: u64, elapsed: Duration) {
    gauge!("proxy_tunnels_active").decrement(1.0);
    counter!("proxy_tunnel_bytes_total", "direction" => "client_to_backend")
        .increment(client_to_backend);
    counter!("proxy_tunnel_bytes_total", "direction" => "backend_to_client")
        .increment(backend_to_client);
    histogram!("proxy_tunnel_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn upgrade_failed(reason: &'static str) {
    counter!("proxy_upgrade_failures_total", "reason" => reason).increment(1);
}

pub fn record_forward(status: u16, elapsed: Duration) {
    histogram!("proxy_forward_duration_seconds", "status" => status.to_string())
        .record(elapsed.as_secs_f64());
}
