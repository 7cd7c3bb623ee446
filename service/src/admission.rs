//! Admission of new reservations.
//!
//! Every step is a hard gate; the first failure aborts and nothing is
//! persisted:
//!
//! 1. Field rules (name, room, start date not in the past), reported together.
//! 2. The end date follows the start date.
//! 3. The stay is at most thirty nights.
//! 4. The room is free for the stay.
//! 5. Card payments carry a reference and the authority confirms it.
//! 6. Atomic check-and-insert. Losing a race at this point is a conflict too.

use crate::metrics;
use crate::overlap::OverlapDetector;
use crate::payment_verifier::{PaymentVerifier, VerificationError};
use room_reservation_core::environment::Clock;
use room_reservation_core::validation::{
    validate_payment_reference, validate_request_fields, validate_stay,
};
use room_reservation_core::{
    PaymentMode, PaymentStatus, Reservation, ReservationError, ReservationId, ReservationRequest,
    ReservationStatus, ReservationStore, StoreError,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Inserts attempted with fresh ids before an id collision is reported.
pub const MAX_ID_ATTEMPTS: usize = 3;

/// Result of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    /// Reference of the new reservation
    pub reservation_id: ReservationId,
    /// Initial status
    pub status: ReservationStatus,
}

/// Creates reservations.
///
/// Safe to share between concurrent callers; the store handle is the only
/// shared state.
pub struct AdmissionController {
    store: Arc<dyn ReservationStore>,
    overlap: OverlapDetector,
    verifier: Arc<PaymentVerifier>,
    clock: Arc<dyn Clock>,
}

impl AdmissionController {
    /// Create a controller.
    #[must_use]
    pub fn new(
        store: Arc<dyn ReservationStore>,
        verifier: Arc<PaymentVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            overlap: OverlapDetector::new(Arc::clone(&store)),
            store,
            verifier,
            clock,
        }
    }

    /// Admit `request`.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::Validation`] for broken field or stay rules, or a
    ///   card payment without reference.
    /// - [`ReservationError::Conflict`] if the room is taken, including when
    ///   a concurrent admission wins the insert.
    /// - [`ReservationError::PaymentRejected`],
    ///   [`ReservationError::InvalidPaymentReference`] or
    ///   [`ReservationError::PaymentServiceUnavailable`] from card verification.
    /// - [`ReservationError::Store`] for storage failures.
    #[tracing::instrument(
        skip_all,
        fields(room = %request.room_number, payment_mode = %request.payment_mode)
    )]
    pub async fn admit(&self, request: ReservationRequest) -> Result<Admission, ReservationError> {
        let started = Instant::now();
        let result = self.try_admit(request).await;

        match &result {
            Ok(admission) => tracing::info!(
                reservation_id = %admission.reservation_id,
                status = %admission.status,
                "Reservation admitted"
            ),
            Err(ReservationError::Store(e)) => {
                tracing::error!(error = %e, "Reservation admission failed on storage");
            }
            Err(e) => tracing::info!(reason = %e, "Reservation refused"),
        }
        metrics::record_admission(outcome_label(&result), started.elapsed());

        result
    }

    async fn try_admit(&self, request: ReservationRequest) -> Result<Admission, ReservationError> {
        validate_request_fields(&request, self.clock.today())?;

        let period = request.period();
        validate_stay(&period)?;

        if self.overlap.has_conflict(&request.room_number, period).await? {
            return Err(ReservationError::Conflict {
                room_number: request.room_number,
            });
        }

        let status = match request.payment_mode {
            PaymentMode::Cash => ReservationStatus::Confirmed,
            PaymentMode::BankTransfer => ReservationStatus::PendingPayment,
            PaymentMode::CreditCard => {
                self.verify_card(request.payment_reference.as_deref()).await?
            }
        };

        self.persist(Reservation::admit(request, status, self.clock.now()))
            .await
    }

    async fn verify_card(&self, reference: Option<&str>) -> Result<ReservationStatus, ReservationError> {
        validate_payment_reference(PaymentMode::CreditCard, reference)?;

        match self.verifier.verify(reference.unwrap_or_default()).await {
            Ok(PaymentStatus::Confirmed) => Ok(ReservationStatus::Confirmed),
            Ok(PaymentStatus::Rejected) => Err(ReservationError::PaymentRejected),
            Err(VerificationError::InvalidReference) => Err(ReservationError::InvalidPaymentReference),
            Err(VerificationError::ServiceUnavailable(cause)) => {
                Err(ReservationError::PaymentServiceUnavailable(cause))
            }
        }
    }

    async fn persist(&self, mut reservation: Reservation) -> Result<Admission, ReservationError> {
        let mut attempt = 1;
        loop {
            match self.store.insert_if_available(reservation.clone()).await {
                Ok(()) => {
                    return Ok(Admission {
                        reservation_id: reservation.id,
                        status: reservation.status,
                    });
                }
                Err(StoreError::DuplicateId(id)) if attempt < MAX_ID_ATTEMPTS => {
                    tracing::warn!(reservation_id = %id, attempt, "Reservation id collision, regenerating");
                    attempt += 1;
                    reservation = reservation.with_id(ReservationId::generate());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn outcome_label(result: &Result<Admission, ReservationError>) -> &'static str {
    match result {
        Ok(Admission {
            status: ReservationStatus::Confirmed,
            ..
        }) => "confirmed",
        Ok(_) => "pending_payment",
        Err(ReservationError::Validation(_)) => "validation",
        Err(ReservationError::Conflict { .. }) => "conflict",
        Err(ReservationError::PaymentRejected) => "payment_rejected",
        Err(ReservationError::InvalidPaymentReference) => "invalid_reference",
        Err(ReservationError::PaymentServiceUnavailable(_)) => "payment_unavailable",
        Err(ReservationError::Store(_)) => "error",
    }
}
