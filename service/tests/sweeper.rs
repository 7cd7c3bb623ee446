//! Expiry of unpaid bank-transfer reservations.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{DateTime, Days, NaiveDate, Utc};
use room_reservation_core::environment::Clock;
use room_reservation_core::store::StoreFuture;
use room_reservation_core::{
    PaymentMode, Reservation, ReservationId, ReservationStatus, ReservationStore, StayPeriod,
    StoreError,
};
use room_reservation_service::{ExpirySweeper, SweepError};
use room_reservation_testing::fixtures::{days_from_today, pending_bank_transfer, reservation, today};
use room_reservation_testing::{InMemoryReservationStore, test_clock};
use std::sync::Arc;
use std::time::Duration;

fn sweeper(store: Arc<dyn ReservationStore>) -> ExpirySweeper {
    ExpirySweeper::new(store, Arc::new(test_clock()), 2)
}

/// Store whose overdue query takes a while, so sweeps overlap.
struct SlowOverdueStore(InMemoryReservationStore);

impl ReservationStore for SlowOverdueStore {
    fn find_by_id(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        self.0.find_by_id(id)
    }

    fn insert_if_available(&self, reservation: Reservation) -> StoreFuture<'_, ()> {
        self.0.insert_if_available(reservation)
    }

    fn update_status(
        &self,
        id: ReservationId,
        expected: ReservationStatus,
        next: ReservationStatus,
        at: DateTime<Utc>,
    ) -> StoreFuture<'_, Option<Reservation>> {
        self.0.update_status(id, expected, next, at)
    }

    fn find_overlapping(&self, room_number: String, period: StayPeriod) -> StoreFuture<'_, Vec<Reservation>> {
        self.0.find_overlapping(room_number, period)
    }

    fn find_overdue_unpaid(&self, threshold: NaiveDate) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.0.find_overdue_unpaid(threshold).await
        })
    }
}

#[test]
fn test_threshold_is_today_plus_grace() {
    let sweeper = sweeper(Arc::new(InMemoryReservationStore::new()));
    assert_eq!(sweeper.threshold(), today() + Days::new(2));
}

#[tokio::test]
async fn test_cancels_only_overdue_pending_bank_transfers() {
    let overdue = [
        pending_bank_transfer("1", today(), 2),
        pending_bank_transfer("2", days_from_today(2), 1),
        // Already started; still unpaid.
        pending_bank_transfer("3", today().pred_opt().unwrap(), 3),
    ];
    let untouched = [
        pending_bank_transfer("4", days_from_today(3), 1),
        reservation("5", today(), days_from_today(1), PaymentMode::Cash, ReservationStatus::Confirmed),
        reservation(
            "6",
            today(),
            days_from_today(1),
            PaymentMode::CreditCard,
            ReservationStatus::PendingPayment,
        ),
        reservation(
            "7",
            today(),
            days_from_today(1),
            PaymentMode::BankTransfer,
            ReservationStatus::Confirmed,
        ),
    ];
    let store = Arc::new(InMemoryReservationStore::with_reservations(
        overdue.iter().chain(untouched.iter()).cloned(),
    ));

    let report = sweeper(store.clone()).run_once().await.unwrap();

    assert_eq!(report.threshold, days_from_today(2));
    assert_eq!(report.candidates, 3);
    assert_eq!(report.cancelled, 3);
    assert_eq!(report.failed, 0);
    for r in &overdue {
        let cancelled = store.get(&r.id).unwrap();
        assert_eq!(cancelled.status, ReservationStatus::Cancelled);
        assert_eq!(cancelled.updated_at, test_clock().now());
    }
    for r in &untouched {
        assert_eq!(store.get(&r.id).unwrap().status, r.status);
    }
}

#[tokio::test]
async fn test_second_sweep_has_nothing_to_do() {
    let store = Arc::new(InMemoryReservationStore::with_reservations([pending_bank_transfer(
        "1",
        today(),
        1,
    )]));
    let sweeper = sweeper(store);

    assert_eq!(sweeper.run_once().await.unwrap().cancelled, 1);
    let again = sweeper.run_once().await.unwrap();
    assert_eq!(again.candidates, 0);
    assert_eq!(again.cancelled, 0);
}

#[tokio::test]
async fn test_one_failing_update_does_not_stop_the_sweep() {
    let broken = pending_bank_transfer("1", today(), 1);
    let fine = pending_bank_transfer("2", days_from_today(1), 1);
    let store = Arc::new(InMemoryReservationStore::with_reservations([broken.clone(), fine.clone()]));
    store.fail_updates_for(broken.id.clone());

    let report = sweeper(store.clone()).run_once().await.unwrap();

    assert_eq!(report.candidates, 2);
    assert_eq!(report.cancelled, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(store.get(&broken.id).unwrap().status, ReservationStatus::PendingPayment);
    assert_eq!(store.get(&fine.id).unwrap().status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn test_failed_overdue_query_aborts_the_run() {
    let store = Arc::new(InMemoryReservationStore::with_reservations([pending_bank_transfer(
        "1",
        today(),
        1,
    )]));
    store.fail_overdue_query(true);

    let result = sweeper(store.clone()).run_once().await;

    assert!(matches!(result, Err(SweepError::Fetch(StoreError::DatabaseError(_)))));
    assert_eq!(store.all()[0].status, ReservationStatus::PendingPayment);
}

#[tokio::test]
async fn test_overlapping_runs_are_refused() {
    let inner = InMemoryReservationStore::with_reservations([pending_bank_transfer("1", today(), 1)]);
    let sweeper = sweeper(Arc::new(SlowOverdueStore(inner.clone())));

    let (first, second) = tokio::join!(sweeper.run_once(), sweeper.run_once());

    let (winner, loser) = if first.is_ok() { (first, second) } else { (second, first) };
    assert_eq!(winner.unwrap().cancelled, 1);
    assert_eq!(loser, Err(SweepError::AlreadyRunning));

    // The guard is released once the run completes.
    assert_eq!(sweeper.run_once().await.unwrap().candidates, 0);
    assert_eq!(inner.all()[0].status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn test_spawned_sweeper_runs_at_startup_and_stops_on_shutdown() {
    let pending = pending_bank_transfer("1", today(), 1);
    let store = Arc::new(InMemoryReservationStore::with_reservations([pending.clone()]));
    let sweeper = Arc::new(sweeper(store.clone()));
    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);

    let handle = sweeper.spawn(Duration::from_secs(3600), shutdown_rx);

    tokio::time::timeout(Duration::from_secs(5), async {
        while store.get(&pending.id).unwrap().status != ReservationStatus::Cancelled {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first tick should sweep immediately");

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("sweeper should stop on shutdown")
        .unwrap();
}
