//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define balancer metrics
//! - Expose a Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `balance_errors_total{kind}` (counter): failed selections by error kind
//! - `health_checkers_active` (gauge): running health checker tasks
//! - `backend_state_transitions_total{state}` (counter): `down` / `up`
//! - `balancer_reloads_total{result}` (counter): `ok` / `partial`
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so library users and tests pay nothing
//! - The exporter is installed by the binary only

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::BalanceError;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_balance_error(err: &BalanceError) {
    counter!("balance_errors_total", "kind" => err.kind()).increment(1);
}

pub fn record_backend_transition(up: bool) {
    let state = if up { "up" } else { "down" };
    counter!("backend_state_transitions_total", "state" => state).increment(1);
}

pub fn health_checker_started() {
    gauge!("health_checkers_active").increment(1.0);
}

pub fn health_checker_stopped() {
    gauge!("health_checkers_active").decrement(1.0);
}

pub fn record_reload(ok: bool) {
    let result = if ok { "ok" } else { "partial" };
    counter!("balancer_reloads_total", "result" => result).increment(1);
}
