//! Errors surfaced to callers of the admission path.

use crate::store::StoreError;
use crate::validation::ValidationErrors;
use thiserror::Error;

/// Why a reservation request was not admitted.
///
/// Each variant is a distinct client-visible outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReservationError {
    /// Request shape or business rule violated.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Room already booked for part of the requested period.
    #[error("Room {room_number} is already booked for the requested period")]
    Conflict {
        /// Contended room
        room_number: String,
    },

    /// The payment authority refused the card payment.
    #[error("The credit card payment was rejected")]
    PaymentRejected,

    /// The payment authority does not know the reference.
    #[error("Invalid or unknown payment reference")]
    InvalidPaymentReference,

    /// The payment authority could not be consulted.
    #[error("Payment service unavailable: {0}")]
    PaymentServiceUnavailable(String),

    /// Anything else; reported to clients as an opaque internal error.
    #[error("Storage failure: {0}")]
    Store(StoreError),
}

impl From<ValidationErrors> for ReservationError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<StoreError> for ReservationError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { room_number, .. } => Self::Conflict { room_number },
            other => Self::Store(other),
        }
    }
}
