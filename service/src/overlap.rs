//! Booking-conflict detection.

use room_reservation_core::{ReservationStore, StayPeriod, StoreError};
use std::sync::Arc;

/// Answers whether a room is free for a stay.
///
/// Only active reservations (pending payment or confirmed) block a room, and
/// stays are half-open, so a stay may start on another's check-out day. The
/// pure predicate is [`StayPeriod::overlaps`].
#[derive(Clone)]
pub struct OverlapDetector {
    store: Arc<dyn ReservationStore>,
}

impl OverlapDetector {
    /// Detector backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ReservationStore>) -> Self {
        Self { store }
    }

    /// Whether any active reservation of `room_number` overlaps `period`.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the query fails.
    pub async fn has_conflict(&self, room_number: &str, period: StayPeriod) -> Result<bool, StoreError> {
        let candidates = self
            .store
            .find_overlapping(room_number.to_owned(), period)
            .await?;
        Ok(candidates.iter().any(|r| r.blocks(room_number, &period)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use room_reservation_core::{PaymentMode, ReservationStatus};
    use room_reservation_testing::InMemoryReservationStore;
    use room_reservation_testing::fixtures::{date, reservation};

    fn detector(existing: Vec<room_reservation_core::Reservation>) -> OverlapDetector {
        OverlapDetector::new(Arc::new(InMemoryReservationStore::with_reservations(existing)))
    }

    #[tokio::test]
    async fn active_overlap_is_a_conflict() {
        let detector = detector(vec![reservation(
            "12",
            date(2026, 5, 1),
            date(2026, 5, 5),
            PaymentMode::BankTransfer,
            ReservationStatus::PendingPayment,
        )]);

        let period = StayPeriod::new(date(2026, 5, 4), date(2026, 5, 8));
        assert!(detector.has_conflict("12", period).await.unwrap());
        assert!(!detector.has_conflict("13", period).await.unwrap());
    }

    #[tokio::test]
    async fn back_to_back_stays_do_not_conflict() {
        let detector = detector(vec![reservation(
            "12",
            date(2026, 5, 1),
            date(2026, 5, 5),
            PaymentMode::Cash,
            ReservationStatus::Confirmed,
        )]);

        let after = StayPeriod::new(date(2026, 5, 5), date(2026, 5, 7));
        let before = StayPeriod::new(date(2026, 4, 28), date(2026, 5, 1));
        assert!(!detector.has_conflict("12", after).await.unwrap());
        assert!(!detector.has_conflict("12", before).await.unwrap());
    }

    #[tokio::test]
    async fn cancelled_reservations_do_not_block() {
        let detector = detector(vec![reservation(
            "12",
            date(2026, 5, 1),
            date(2026, 5, 5),
            PaymentMode::BankTransfer,
            ReservationStatus::Cancelled,
        )]);

        let period = StayPeriod::new(date(2026, 5, 2), date(2026, 5, 3));
        assert!(!detector.has_conflict("12", period).await.unwrap());
    }
}
