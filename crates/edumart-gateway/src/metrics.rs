//! Prometheus metrics for the gateway.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    pub const WS_CONNECTIONS_TOTAL: &str = "edumart_gateway_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "edumart_gateway_ws_connections_active";
    pub const ROOM_JOINS_TOTAL: &str = "edumart_gateway_room_joins_total";
    pub const ROOMS_ACTIVE: &str = "edumart_gateway_rooms_active";
    pub const EVENTS_DELIVERED_TOTAL: &str = "edumart_gateway_events_delivered_total";
    pub const RATE_LIMIT_HITS_TOTAL: &str = "edumart_gateway_rate_limit_hits_total";
}

pub fn record_ws_connection() {
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
}

pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

pub fn record_room_join(scope: &'static str) {
    counter!(names::ROOM_JOINS_TOTAL, "scope" => scope).increment(1);
}

pub fn set_rooms_active(count: usize) {
    gauge!(names::ROOMS_ACTIVE).set(count as f64);
}

pub fn record_event_delivered(event: &'static str) {
    counter!(names::EVENTS_DELIVERED_TOTAL, "event" => event).increment(1);
}

pub fn record_rate_limit_hit() {
    counter!(names::RATE_LIMIT_HITS_TOTAL).increment(1);
}
