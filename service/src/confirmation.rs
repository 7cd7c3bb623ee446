//! Confirmation of bank-transfer reservations from payment-update events.

use crate::metrics;
use room_reservation_core::environment::Clock;
use room_reservation_core::payment_event::decode_json;
use room_reservation_core::{
    EventDecoder, HandlerError, MessageFormatError, MessageHandler, ReservationId,
    ReservationStatus, ReservationStore, StoreError,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// What processing an event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    /// A pending bank transfer was confirmed.
    Confirmed(ReservationId),
    /// No reservation has this id. Acknowledged without effect.
    NotFound(ReservationId),
    /// The reservation is not a pending bank transfer (already confirmed,
    /// cancelled, or paid another way). Acknowledged without effect.
    Unchanged {
        /// Reservation the event referred to
        id: ReservationId,
        /// Its status when the event was processed
        status: ReservationStatus,
    },
}

/// The event must be redelivered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationError {
    /// The payload does not reference a reservation.
    #[error(transparent)]
    Format(#[from] MessageFormatError),

    /// The store failed.
    #[error("Storage failure while confirming payment: {0}")]
    Store(#[from] StoreError),
}

/// Confirms pending bank-transfer reservations.
///
/// Processing is idempotent: replaying an event for an already confirmed
/// reservation is an acknowledged no-op.
pub struct ConfirmationHandler {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    decode: EventDecoder,
}

impl ConfirmationHandler {
    /// Handler decoding JSON events.
    #[must_use]
    pub fn new(store: Arc<dyn ReservationStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            decode: decode_json,
        }
    }

    /// Replace the payload decoder.
    #[must_use]
    pub fn with_decoder(mut self, decode: EventDecoder) -> Self {
        self.decode = decode;
        self
    }

    /// Process one payload.
    ///
    /// # Errors
    ///
    /// - [`ConfirmationError::Format`] if the payload cannot be decoded or does
    ///   not carry a well-formed reservation id.
    /// - [`ConfirmationError::Store`] if a lookup or update fails.
    #[tracing::instrument(skip_all)]
    pub async fn process(&self, payload: &[u8]) -> Result<ConfirmationOutcome, ConfirmationError> {
        let event = (self.decode)(payload).inspect_err(|e| {
            tracing::warn!(error = %e, "Rejecting malformed payment update");
        })?;
        let id = event.reservation_id().inspect_err(|e| {
            tracing::warn!(
                payment_id = ?event.payment_id,
                error = %e,
                "Payment update does not reference a reservation"
            );
        })?;

        let outcome = self.confirm(id).await?;
        match &outcome {
            ConfirmationOutcome::Confirmed(id) => {
                tracing::info!(reservation_id = %id, payment_id = ?event.payment_id, "Bank transfer confirmed");
                metrics::record_confirmation("confirmed");
            }
            ConfirmationOutcome::NotFound(id) => {
                tracing::info!(reservation_id = %id, "Payment update for unknown reservation, skipping");
                metrics::record_confirmation("not_found");
            }
            ConfirmationOutcome::Unchanged { id, status } => {
                tracing::info!(reservation_id = %id, status = %status, "Reservation not awaiting a transfer, skipping");
                metrics::record_confirmation("unchanged");
            }
        }
        Ok(outcome)
    }

    async fn confirm(&self, id: ReservationId) -> Result<ConfirmationOutcome, StoreError> {
        let Some(current) = self.store.find_by_id(id.clone()).await? else {
            return Ok(ConfirmationOutcome::NotFound(id));
        };

        if !current.is_awaiting_bank_transfer() {
            return Ok(ConfirmationOutcome::Unchanged {
                id,
                status: current.status,
            });
        }

        let updated = self
            .store
            .update_status(
                id.clone(),
                ReservationStatus::PendingPayment,
                ReservationStatus::Confirmed,
                self.clock.now(),
            )
            .await?;

        if updated.is_some() {
            return Ok(ConfirmationOutcome::Confirmed(id));
        }

        // Lost the compare-and-set, most likely to the expiry sweeper.
        let status = self
            .store
            .find_by_id(id.clone())
            .await?
            .map_or(current.status, |r| r.status);
        Ok(ConfirmationOutcome::Unchanged { id, status })
    }
}

impl MessageHandler for ConfirmationHandler {
    fn handle<'a>(
        &'a self,
        payload: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move {
            self.process(payload).await?;
            Ok(())
        })
    }
}
