//! Prometheus metrics recorder and `/metrics` endpoint handler.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the `PrometheusHandle` used to render the `/metrics` endpoint.
/// Must be called once at server startup before any metrics are recorded.
pub fn install_recorder() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install metrics recorder");
    info!("prometheus metrics recorder installed");
    handle
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across crates.

/// Chain requests total (counter).
pub const CHAIN_REQUESTS_TOTAL: &str = "chain_requests_total";
/// Chain responses total (counter, labels: handler).
pub const CHAIN_RESPONSES_TOTAL: &str = "chain_responses_total";
/// Chain errors total (counter, labels: handler).
pub const CHAIN_ERRORS_TOTAL: &str = "chain_errors_total";
/// Chain request duration seconds (histogram, labels: handler).
pub const CHAIN_REQUEST_DURATION_SECONDS: &str = "chain_request_duration_seconds";
/// Events processed total (counter).
pub const EVENTS_PROCESSED_TOTAL: &str = "events_processed_total";
/// Events failed total (counter, labels: stage).
pub const EVENTS_FAILED_TOTAL: &str = "events_failed_total";
/// Bus publish failures observed by the event service (counter).
pub const EVENTS_PUBLISH_FAILURES_TOTAL: &str = "events_publish_failures_total";
/// Bus publishes total (counter).
pub const BUS_PUBLISH_TOTAL: &str = "bus_publish_total";
/// Bus subscriber lag drops total (counter).
pub const BUS_SUBSCRIBER_LAG_TOTAL: &str = "bus_subscriber_lag_total";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Broadcast drops total (counter).
pub const WS_BROADCAST_DROPS_TOTAL: &str = "ws_broadcast_drops_total";
/// Malformed inbound frames total (counter).
pub const WS_MALFORMED_FRAMES_TOTAL: &str = "ws_malformed_frames_total";
/// WebSocket connection duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_and_render() {
        // Build a recorder + handle (no global install to avoid test conflicts).
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            CHAIN_REQUESTS_TOTAL,
            CHAIN_RESPONSES_TOTAL,
            CHAIN_ERRORS_TOTAL,
            CHAIN_REQUEST_DURATION_SECONDS,
            EVENTS_PROCESSED_TOTAL,
            EVENTS_FAILED_TOTAL,
            EVENTS_PUBLISH_FAILURES_TOTAL,
            BUS_PUBLISH_TOTAL,
            BUS_SUBSCRIBER_LAG_TOTAL,
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_BROADCAST_DROPS_TOTAL,
            WS_MALFORMED_FRAMES_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
