//! Reservation repository trait.
//!
//! The store is the only shared mutable resource in the system. Every status
//! change is applied as a compare-and-set on the expected prior status, and the
//! overlap check plus insert for a new reservation is one atomic operation.

use crate::reservation::{Reservation, ReservationId, ReservationStatus, StayPeriod};
use chrono::{DateTime, NaiveDate, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An active reservation already occupies the room for part of the period.
    #[error("Room {room_number} is already booked between {start} and {end}")]
    Conflict {
        /// Contended room
        room_number: String,
        /// Requested first night
        start: NaiveDate,
        /// Requested check-out date
        end: NaiveDate,
    },

    /// The generated identifier is already taken.
    #[error("Reservation id {0} is already taken")]
    DuplicateId(ReservationId),

    /// Database operation failed.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored row could not be mapped back to a reservation.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Repository of reservations.
///
/// Implementations must be safe to share between the admission path, the
/// confirmation consumer and the expiry sweeper.
pub trait ReservationStore: Send + Sync {
    /// Point lookup by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn find_by_id(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>>;

    /// Insert `reservation` unless an active reservation for the same room overlaps
    /// its period. The check and the insert happen as one atomic unit.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] if the room is taken for part of the period
    /// - [`StoreError::DuplicateId`] if the id is already used
    /// - [`StoreError::DatabaseError`] on backend failure
    fn insert_if_available(&self, reservation: Reservation) -> StoreFuture<'_, ()>;

    /// Move `id` from `expected` to `next`, stamping `updated_at` with `at`.
    ///
    /// Returns the updated record, or `None` when the reservation does not exist
    /// or is no longer in `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn update_status(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        next: ReservationStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Reservation>>;

    /// Active reservations for `room_number` whose period overlaps `period`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn find_overlapping(
        &self,
        room_number: String,
        period: StayPeriod,
    ) -> StoreFuture<'_, Vec<Reservation>>;

    /// Bank-transfer reservations still pending payment whose start date is on or
    /// before `threshold`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn find_overdue_unpaid(&self, threshold: NaiveDate) -> StoreFuture<'_, Vec<Reservation>>;
}
