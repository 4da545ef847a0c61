//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_forward_total` (counter): forwarded requests by variant, CoAP code
//! - `gateway_forward_duration_seconds` (histogram): outbound latency by variant
//! - `gateway_pool_exhausted_total` (counter): handles created beyond capacity
//! - `gateway_http_requests_total` (counter): ingress requests by route, status
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::coap::message::Code;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_forward(variant: &'static str, code: Code, started: Instant) {
    ::metrics::counter!(
        "gateway_forward_total",
        "variant" => variant,
        "code" => code.to_string()
    )
    .increment(1);
    ::metrics::histogram!("gateway_forward_duration_seconds", "variant" => variant)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_pool_exhausted(pool: &'static str) {
    ::metrics::counter!("gateway_pool_exhausted_total", "pool" => pool).increment(1);
}

pub fn record_http_request(route: &'static str, status: u16) {
    ::metrics::counter!(
        "gateway_http_requests_total",
        "route" => route,
        "status" => status.to_string()
    )
    .increment(1);
}
