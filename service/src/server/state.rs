//! State shared by HTTP handlers.

use crate::admission::AdmissionController;
use room_reservation_core::ReservationStore;
use room_reservation_runtime::metrics::PrometheusMetrics;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Admission path for `POST /reservations`
    pub admission: Arc<AdmissionController>,
    /// Read path for `GET /reservations/:id`
    pub store: Arc<dyn ReservationStore>,
    /// Recorder handle for `GET /metrics`
    pub metrics: Arc<PrometheusMetrics>,
}

impl AppState {
    /// Create the state.
    #[must_use]
    pub fn new(
        admission: Arc<AdmissionController>,
        store: Arc<dyn ReservationStore>,
        metrics: Arc<PrometheusMetrics>,
    ) -> Self {
        Self {
            admission,
            store,
            metrics,
        }
    }
}
