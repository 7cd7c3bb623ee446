//! Router configuration.

use super::state::AppState;
use crate::api::reservations::{create_reservation, get_reservation};
use axum::{
    Router,
    extract::State,
    response::Response,
    routing::{get, post},
};
use room_reservation_web::handlers::{health_check, metrics_response};
use room_reservation_web::middleware::http_trace_layer;

/// Build the complete router.
///
/// - `POST /reservations`
/// - `GET /reservations/:id`
/// - `GET /health`
/// - `GET /metrics`
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/reservations", post(create_reservation))
        .route("/reservations/:id", get(get_reservation))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(http_trace_layer())
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn metrics(State(state): State<AppState>) -> Response {
    metrics_response(&state.metrics)
}
