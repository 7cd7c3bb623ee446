//! Expiry of unpaid bank-transfer reservations.
//!
//! A bank transfer that has not arrived shortly before the stay begins will
//! not arrive in time. [`ExpirySweeper`] cancels every pending bank-transfer
//! reservation starting on or before `today + grace_days`.

use crate::metrics;
use chrono::{Days, NaiveDate};
use room_reservation_core::environment::Clock;
use room_reservation_core::{ReservationStatus, ReservationStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Summary of one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Latest start date considered overdue
    pub threshold: NaiveDate,
    /// Reservations returned by the overdue query
    pub candidates: usize,
    /// Reservations cancelled by this run
    pub cancelled: usize,
    /// Reservations that changed status before they could be cancelled
    pub skipped: usize,
    /// Reservations whose cancellation failed
    pub failed: usize,
}

/// A sweep that did not run to completion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SweepError {
    /// Another sweep holds the run lock.
    #[error("An expiry sweep is already running")]
    AlreadyRunning,

    /// The overdue query failed; nothing was cancelled.
    #[error("Failed to fetch overdue reservations: {0}")]
    Fetch(StoreError),
}

/// Cancels overdue unpaid reservations. Runs are single-flight.
pub struct ExpirySweeper {
    store: Arc<dyn ReservationStore>,
    clock: Arc<dyn Clock>,
    grace_days: u64,
    running: Mutex<()>,
}

impl ExpirySweeper {
    /// Create a sweeper.
    #[must_use]
    pub fn new(store: Arc<dyn ReservationStore>, clock: Arc<dyn Clock>, grace_days: u64) -> Self {
        Self {
            store,
            clock,
            grace_days,
            running: Mutex::new(()),
        }
    }

    /// Latest start date a run would cancel.
    #[must_use]
    pub fn threshold(&self) -> NaiveDate {
        self.clock
            .today()
            .checked_add_days(Days::new(self.grace_days))
            .unwrap_or(NaiveDate::MAX)
    }

    /// Run one sweep.
    ///
    /// Each cancellation is independent: a failure is counted and logged and
    /// the sweep moves on.
    ///
    /// # Errors
    ///
    /// - [`SweepError::AlreadyRunning`] if another run is in flight.
    /// - [`SweepError::Fetch`] if the overdue query fails.
    #[tracing::instrument(skip_all)]
    pub async fn run_once(&self) -> Result<SweepReport, SweepError> {
        let Ok(_guard) = self.running.try_lock() else {
            return Err(SweepError::AlreadyRunning);
        };

        let threshold = self.threshold();
        tracing::info!(%threshold, "Starting expiry sweep");

        let overdue = self
            .store
            .find_overdue_unpaid(threshold)
            .await
            .map_err(SweepError::Fetch)?;

        let mut report = SweepReport {
            threshold,
            candidates: overdue.len(),
            cancelled: 0,
            skipped: 0,
            failed: 0,
        };

        let now = self.clock.now();
        for reservation in overdue {
            let result = self
                .store
                .update_status(
                    reservation.id.clone(),
                    ReservationStatus::PendingPayment,
                    ReservationStatus::Cancelled,
                    now,
                )
                .await;

            match result {
                Ok(Some(_)) => {
                    report.cancelled += 1;
                    tracing::info!(reservation_id = %reservation.id, start_date = %reservation.start_date, "Cancelled unpaid reservation");
                }
                Ok(None) => {
                    report.skipped += 1;
                    tracing::debug!(reservation_id = %reservation.id, "Reservation changed before cancellation, skipping");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(reservation_id = %reservation.id, error = %e, "Failed to cancel reservation, continuing");
                }
            }
        }

        metrics::record_sweep(report.cancelled, report.failed);
        tracing::info!(
            %threshold,
            candidates = report.candidates,
            cancelled = report.cancelled,
            skipped = report.skipped,
            failed = report.failed,
            "Expiry sweep completed"
        );
        Ok(report)
    }

    /// Run a sweep every `period` until `shutdown` fires.
    ///
    /// The first sweep runs immediately. Ticks missed while a sweep is still
    /// running are skipped rather than queued.
    pub fn spawn(self: Arc<Self>, period: Duration, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        tracing::info!("Expiry sweeper shutting down");
                        return;
                    }
                    _ = ticker.tick() => match self.run_once().await {
                        Ok(_) => {}
                        Err(SweepError::AlreadyRunning) => {
                            tracing::debug!("Previous expiry sweep still running, skipping tick");
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Expiry sweep failed, will retry next tick");
                        }
                    },
                }
            }
        })
    }
}
