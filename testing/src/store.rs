//! In-memory reservation store.

use chrono::{DateTime, NaiveDate, Utc};
use room_reservation_core::store::{ReservationStore, StoreError, StoreFuture};
use room_reservation_core::{Reservation, ReservationId, ReservationStatus, StayPeriod};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Inner {
    rows: HashMap<ReservationId, Reservation>,
    failing_updates: HashSet<ReservationId>,
    fail_lookups: bool,
    fail_overdue_query: bool,
    inserts: usize,
}

/// Store backed by a `HashMap`.
///
/// The overlap check and the insert run under one lock, so concurrent
/// admissions observe the same atomicity as the Postgres store. Failures can be
/// injected per reservation or per query to exercise error paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReservationStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryReservationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `reservations`, bypassing the overlap check.
    #[must_use]
    pub fn with_reservations(reservations: impl IntoIterator<Item = Reservation>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.lock();
            for reservation in reservations {
                inner.rows.insert(reservation.id.clone(), reservation);
            }
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current copy of one reservation.
    #[must_use]
    pub fn get(&self, id: &ReservationId) -> Option<Reservation> {
        self.lock().rows.get(id).cloned()
    }

    /// Copy of every stored reservation.
    #[must_use]
    pub fn all(&self) -> Vec<Reservation> {
        self.lock().rows.values().cloned().collect()
    }

    /// Number of stored reservations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful inserts through [`ReservationStore::insert_if_available`].
    #[must_use]
    pub fn inserts(&self) -> usize {
        self.lock().inserts
    }

    /// Make every status update of `id` fail with a database error.
    pub fn fail_updates_for(&self, id: ReservationId) {
        self.lock().failing_updates.insert(id);
    }

    /// Make point lookups fail with a database error.
    pub fn fail_lookups(&self, fail: bool) {
        self.lock().fail_lookups = fail;
    }

    /// Make the overdue query fail with a database error.
    pub fn fail_overdue_query(&self, fail: bool) {
        self.lock().fail_overdue_query = fail;
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::DatabaseError(format!("injected {what} failure"))
}

impl ReservationStore for InMemoryReservationStore {
    fn find_by_id(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            let inner = self.lock();
            if inner.fail_lookups {
                return Err(injected("lookup"));
            }
            Ok(inner.rows.get(&id).cloned())
        })
    }

    fn insert_if_available(&self, reservation: Reservation) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut inner = self.lock();
            if inner.rows.contains_key(&reservation.id) {
                return Err(StoreError::DuplicateId(reservation.id));
            }
            let period = reservation.period();
            if reservation.status.is_active()
                && inner
                    .rows
                    .values()
                    .any(|existing| existing.blocks(&reservation.room_number, &period))
            {
                return Err(StoreError::Conflict {
                    room_number: reservation.room_number,
                    start: period.start,
                    end: period.end,
                });
            }
            inner.inserts += 1;
            inner.rows.insert(reservation.id.clone(), reservation);
            Ok(())
        })
    }

    fn update_status(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        next: ReservationStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            let mut inner = self.lock();
            if inner.failing_updates.contains(&id) {
                return Err(injected("update"));
            }
            let Some(current) = inner.rows.get(&id) else {
                return Ok(None);
            };
            if current.status != expected {
                return Ok(None);
            }
            let updated = current.clone().with_status(next, at);
            inner.rows.insert(id, updated.clone());
            Ok(Some(updated))
        })
    }

    fn find_overlapping(
        &self,
        room_number: String,
        period: StayPeriod,
    ) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let inner = self.lock();
            Ok(inner
                .rows
                .values()
                .filter(|r| r.blocks(&room_number, &period))
                .cloned()
                .collect())
        })
    }

    fn find_overdue_unpaid(&self, threshold: NaiveDate) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let inner = self.lock();
            if inner.fail_overdue_query {
                return Err(injected("overdue query"));
            }
            let mut overdue: Vec<Reservation> = inner
                .rows
                .values()
                .filter(|r| r.is_awaiting_bank_transfer() && r.start_date <= threshold)
                .cloned()
                .collect();
            overdue.sort_by(|a, b| a.start_date.cmp(&b.start_date).then_with(|| a.id.cmp(&b.id)));
            Ok(overdue)
        })
    }
}
