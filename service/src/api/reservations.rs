//! Reservation endpoints.
//!
//! - `POST /reservations` - admit a reservation
//! - `GET /reservations/:id` - read a reservation back
//!
//! # Status Codes
//!
//! | Outcome                                         | Status |
//! |-------------------------------------------------|--------|
//! | Admitted                                        | 201    |
//! | Unreadable body, validation, rejected payment, invalid reference | 400 |
//! | Room already booked                             | 409    |
//! | Payment authority unavailable                   | 503    |
//! | Anything else                                   | 500    |

use crate::admission::Admission;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use room_reservation_core::{Reservation, ReservationError, ReservationId, ReservationRequest};
use room_reservation_web::{AppError, JsonBody, WebResult};

/// Message returned with 503 when the payment authority cannot be reached.
pub const PAYMENT_UNAVAILABLE_MESSAGE: &str =
    "Try later, credit card service temporarily unavailable";

/// Map an admission error onto its HTTP response.
///
/// Storage details never reach the client.
#[must_use]
pub fn into_app_error(error: ReservationError) -> AppError {
    match error {
        ReservationError::Validation(errors) => {
            AppError::bad_request("Validation failed for request body").with_details(&errors)
        }
        ReservationError::Conflict { .. } => AppError::conflict(error.to_string()),
        ReservationError::PaymentRejected | ReservationError::InvalidPaymentReference => {
            AppError::bad_request(error.to_string())
        }
        ReservationError::PaymentServiceUnavailable(cause) => {
            AppError::unavailable(PAYMENT_UNAVAILABLE_MESSAGE).with_source(anyhow::anyhow!(cause))
        }
        ReservationError::Store(e) => AppError::internal("An unexpected error occurred. Please try again later.")
            .with_source(anyhow::Error::new(e)),
    }
}

/// Admit a reservation.
///
/// # Endpoint
///
/// ```text
/// POST /reservations
/// ```
///
/// # Response
///
/// ```json
/// { "reservationId": "AB12CD34", "status": "CONFIRMED" }
/// ```
///
/// # Errors
///
/// See the module table.
pub async fn create_reservation(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<ReservationRequest>,
) -> WebResult<(StatusCode, Json<Admission>)> {
    let admission = state.admission.admit(request).await.map_err(into_app_error)?;
    Ok((StatusCode::CREATED, Json(admission)))
}

/// Read a reservation.
///
/// # Endpoint
///
/// ```text
/// GET /reservations/:id
/// ```
///
/// # Errors
///
/// 400 for a malformed id, 404 for an unknown one, 500 if the store fails.
pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> WebResult<Json<Reservation>> {
    let id = ReservationId::parse(&id).map_err(|e| AppError::bad_request(e.to_string()))?;

    match state.store.find_by_id(id.clone()).await {
        Ok(Some(reservation)) => Ok(Json(reservation)),
        Ok(None) => Err(AppError::not_found("Reservation", id)),
        Err(e) => Err(AppError::internal("Failed to load reservation").with_source(anyhow::Error::new(e))),
    }
}
