//! Business metrics for the reservation service.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `reservation_admissions_total{outcome}` - Admission attempts by outcome
//! - `reservation_payment_verifications_total{result}` - Card verifications by result
//! - `reservation_confirmations_total{outcome}` - Payment updates by outcome
//! - `reservation_expirations_total` - Reservations cancelled by the sweeper
//! - `reservation_sweep_failures_total` - Per-item sweeper failures
//!
//! ## Histograms
//! - `reservation_admission_duration_seconds` - Admission latency
//! - `reservation_payment_verification_duration_seconds` - Verification latency

use metrics::{describe_counter, describe_histogram};
use std::time::Duration;

/// Register descriptions for all business metrics.
///
/// Call once at startup, after the recorder is installed.
pub fn register_business_metrics() {
    describe_counter!(
        "reservation_admissions_total",
        "Reservation admission attempts by outcome (confirmed, pending_payment, validation, conflict, ...)"
    );
    describe_histogram!(
        "reservation_admission_duration_seconds",
        "Time taken to admit or refuse a reservation"
    );
    describe_counter!(
        "reservation_payment_verifications_total",
        "Credit card verifications by result (confirmed, rejected, invalid_reference, unavailable)"
    );
    describe_histogram!(
        "reservation_payment_verification_duration_seconds",
        "Time taken to verify a credit card payment, retries included"
    );
    describe_counter!(
        "reservation_confirmations_total",
        "Bank-transfer payment updates by outcome (confirmed, not_found, unchanged)"
    );
    describe_counter!(
        "reservation_expirations_total",
        "Unpaid bank-transfer reservations cancelled by the expiry sweeper"
    );
    describe_counter!(
        "reservation_sweep_failures_total",
        "Reservations the expiry sweeper failed to cancel"
    );

    tracing::info!("Business metrics registered");
}

/// Record one admission attempt.
pub fn record_admission(outcome: &'static str, duration: Duration) {
    metrics::counter!("reservation_admissions_total", "outcome" => outcome).increment(1);
    metrics::histogram!("reservation_admission_duration_seconds").record(duration.as_secs_f64());
}

/// Record one payment verification.
pub fn record_verification(result: &'static str, duration: Duration) {
    metrics::counter!("reservation_payment_verifications_total", "result" => result).increment(1);
    metrics::histogram!("reservation_payment_verification_duration_seconds")
        .record(duration.as_secs_f64());
}

/// Record one processed payment update.
pub fn record_confirmation(outcome: &'static str) {
    metrics::counter!("reservation_confirmations_total", "outcome" => outcome).increment(1);
}

/// Record a sweep run.
pub fn record_sweep(cancelled: usize, failed: usize) {
    metrics::counter!("reservation_expirations_total").increment(cancelled as u64);
    metrics::counter!("reservation_sweep_failures_total").increment(failed as u64);
}
