//! `PostgreSQL` reservation store.
//!
//! Implements [`ReservationStore`] on top of sqlx. Admission uses
//! [`ReservationStore::insert_if_available`], which runs the overlap check and the
//! insert inside one `SERIALIZABLE` transaction. The schema also carries an
//! exclusion constraint over `(room_number, daterange(start_date, end_date))` for
//! active rows, so the database itself refuses a double booking even if a
//! writer bypasses this crate.
//!
//! # Example
//!
//! ```ignore
//! use room_reservation_postgres::PostgresReservationStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresReservationStore::connect("postgres://localhost/reservations", 10).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use room_reservation_core::store::{ReservationStore, StoreError, StoreFuture};
use room_reservation_core::{
    PaymentMode, Reservation, ReservationId, ReservationStatus, RoomSegment, StayPeriod,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;

/// SQLSTATE raised when a serializable transaction must be retried.
const SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE raised by the exclusion constraint.
const EXCLUSION_VIOLATION: &str = "23P01";
/// SQLSTATE raised by the primary key.
const UNIQUE_VIOLATION: &str = "23505";

/// Attempts of the admission transaction before giving up on serialization failures.
const MAX_SERIALIZATION_ATTEMPTS: usize = 10;

const COLUMNS: &str = "id, customer_name, room_number, start_date, end_date, segment, \
                       payment_mode, payment_reference, status, created_at, updated_at";

/// Reservation store backed by a `PostgreSQL` connection pool.
#[derive(Debug, Clone)]
pub struct PostgresReservationStore {
    pool: PgPool,
}

enum InsertOutcome {
    Inserted,
    Occupied,
}

impl PostgresReservationStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool against `database_url`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if no connection can be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        Ok(Self::from_pool(pool))
    }

    /// Apply the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DatabaseError`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::DatabaseError(e.to_string()))?;
        tracing::info!("Reservation schema migrated");
        Ok(())
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn try_insert(&self, reservation: &Reservation) -> Result<InsertOutcome, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let occupied = sqlx::query(
            r"
            SELECT 1 FROM reservations
            WHERE room_number = $1
              AND status IN ('PENDING_PAYMENT', 'CONFIRMED')
              AND start_date < $3
              AND $2 < end_date
            LIMIT 1
            ",
        )
        .bind(&reservation.room_number)
        .bind(reservation.start_date)
        .bind(reservation.end_date)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();

        if occupied && reservation.status.is_active() {
            tx.rollback().await?;
            return Ok(InsertOutcome::Occupied);
        }

        sqlx::query(
            r"
            INSERT INTO reservations (
                id, customer_name, room_number, start_date, end_date, segment,
                payment_mode, payment_reference, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ",
        )
        .bind(reservation.id.as_str())
        .bind(&reservation.customer_name)
        .bind(&reservation.room_number)
        .bind(reservation.start_date)
        .bind(reservation.end_date)
        .bind(reservation.segment.as_str())
        .bind(reservation.payment_mode.as_str())
        .bind(reservation.payment_reference.as_deref())
        .bind(reservation.status.as_str())
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(InsertOutcome::Inserted)
    }
}

fn sqlstate(error: &sqlx::Error) -> Option<String> {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

fn database_error(error: &sqlx::Error) -> StoreError {
    StoreError::DatabaseError(error.to_string())
}

fn conflict(reservation: Reservation) -> StoreError {
    StoreError::Conflict {
        room_number: reservation.room_number,
        start: reservation.start_date,
        end: reservation.end_date,
    }
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::CorruptRow(format!("{name}: {e}")))
}

fn parse_column<T: FromStr>(row: &PgRow, name: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    let raw: String = column(row, name)?;
    raw.parse()
        .map_err(|e: T::Err| StoreError::CorruptRow(format!("{name}: {e}")))
}

fn reservation_from_row(row: &PgRow) -> Result<Reservation, StoreError> {
    Ok(Reservation {
        id: parse_column::<ReservationId>(row, "id")?,
        customer_name: column(row, "customer_name")?,
        room_number: column(row, "room_number")?,
        start_date: column(row, "start_date")?,
        end_date: column(row, "end_date")?,
        segment: parse_column::<RoomSegment>(row, "segment")?,
        payment_mode: parse_column::<PaymentMode>(row, "payment_mode")?,
        payment_reference: column(row, "payment_reference")?,
        status: parse_column::<ReservationStatus>(row, "status")?,
        created_at: column(row, "created_at")?,
        updated_at: column(row, "updated_at")?,
    })
}

fn reservations_from_rows(rows: &[PgRow]) -> Result<Vec<Reservation>, StoreError> {
    rows.iter().map(reservation_from_row).collect()
}

impl ReservationStore for PostgresReservationStore {
    fn find_by_id(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {COLUMNS} FROM reservations WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| database_error(&e))?;

            row.as_ref().map(reservation_from_row).transpose()
        })
    }

    fn insert_if_available(&self, reservation: Reservation) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match self.try_insert(&reservation).await {
                    Ok(InsertOutcome::Inserted) => {
                        metrics::counter!("reservation_store_inserts_total").increment(1);
                        tracing::debug!(reservation_id = %reservation.id, attempt, "Reservation inserted");
                        return Ok(());
                    }
                    Ok(InsertOutcome::Occupied) => return Err(conflict(reservation)),
                    Err(e) => match sqlstate(&e).as_deref() {
                        Some(SERIALIZATION_FAILURE) if attempt < MAX_SERIALIZATION_ATTEMPTS => {
                            metrics::counter!("reservation_store_serialization_retries_total")
                                .increment(1);
                            tracing::debug!(
                                room = %reservation.room_number,
                                attempt,
                                "Serialization failure on admission, retrying"
                            );
                        }
                        Some(EXCLUSION_VIOLATION) => {
                            return Err(conflict(reservation));
                        }
                        Some(UNIQUE_VIOLATION) => {
                            return Err(StoreError::DuplicateId(reservation.id));
                        }
                        _ => return Err(database_error(&e)),
                    },
                }
            }
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
            let row = sqlx::query(&format!(
                "UPDATE reservations SET status = $3, updated_at = $4 \
                 WHERE id = $1 AND status = $2 RETURNING {COLUMNS}"
            ))
            .bind(id.as_str())
            .bind(expected.as_str())
            .bind(next.as_str())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| database_error(&e))?;

            if row.is_some() {
                tracing::debug!(
                    reservation_id = %id,
                    from = expected.as_str(),
                    to = next.as_str(),
                    "Reservation status updated"
                );
            }
            row.as_ref().map(reservation_from_row).transpose()
        })
    }

    fn find_overlapping(
        &self,
        room_number: String,
        period: StayPeriod,
    ) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {COLUMNS} FROM reservations \
                 WHERE room_number = $1 \
                   AND status IN ('PENDING_PAYMENT', 'CONFIRMED') \
                   AND start_date < $3 AND $2 < end_date \
                 ORDER BY start_date"
            ))
            .bind(&room_number)
            .bind(period.start)
            .bind(period.end)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error(&e))?;

            reservations_from_rows(&rows)
        })
    }

    fn find_overdue_unpaid(&self, threshold: NaiveDate) -> StoreFuture<'_, Vec<Reservation>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {COLUMNS} FROM reservations \
                 WHERE status = 'PENDING_PAYMENT' \
                   AND payment_mode = 'BANK_TRANSFER' \
                   AND start_date <= $1 \
                 ORDER BY start_date, id"
            ))
            .bind(threshold)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| database_error(&e))?;

            reservations_from_rows(&rows)
        })
    }
}
