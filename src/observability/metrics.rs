//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define relay metrics (dispatches, latency, tunnel sessions)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `relay_dispatch_total` (counter): dispatches by transport, status
//! - `relay_dispatch_duration_seconds` (histogram): latency by transport
//! - `relay_tunnel_sessions_active` (gauge): open tunnel sessions
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels for transport and status code only (bounded cardinality)

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Transport label for requests arriving over a tunnel session.
pub const TRANSPORT_TUNNEL: &str = "tunnel";

/// Transport label for requests arriving over plain HTTP.
pub const TRANSPORT_HTTP: &str = "http";

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

/// Record one completed dispatch.
pub fn record_dispatch(transport: &'static str, status: u16, start: Instant) {
    counter!(
        "relay_dispatch_total",
        "transport" => transport,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("relay_dispatch_duration_seconds", "transport" => transport)
        .record(start.elapsed().as_secs_f64());
}

/// Record a tunnel session opening.
pub fn session_opened() {
    gauge!("relay_tunnel_sessions_active").increment(1.0);
}

/// Record a tunnel session closing.
pub fn session_closed() {
    gauge!("relay_tunnel_sessions_active").decrement(1.0);
}
