//! Prometheus scrape endpoint.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use room_reservation_runtime::metrics::PrometheusMetrics;

/// Content type of the Prometheus text exposition format.
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Render `metrics` for a scrape.
///
/// Answers 503 when this process did not install the recorder, e.g. when a
/// recorder from another component is already active.
#[must_use]
pub fn metrics_response(metrics: &PrometheusMetrics) -> Response {
    match metrics.render() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninstalled_recorder_is_unavailable() {
        let response = metrics_response(&PrometheusMetrics::new());
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
