//! Explicit validation rules for reservation requests.
//!
//! Every rule reports `(field, message)` pairs so callers can surface them
//! without a transport layer in between.

use crate::reservation::{PaymentMode, ReservationRequest, StayPeriod};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Longest stay that can be booked in one reservation, in nights.
pub const MAX_STAY_DAYS: i64 = 30;

/// Accepted customer name length, in characters.
pub const CUSTOMER_NAME_LEN: std::ops::RangeInclusive<usize> = 2..=100;

/// Accepted room number length, in characters.
pub const ROOM_NUMBER_LEN: std::ops::RangeInclusive<usize> = 1..=10;

/// A single rule violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Request field the message refers to
    pub field: &'static str,
    /// Human readable message
    pub message: String,
}

/// A non-empty list of rule violations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Create an empty collector.
    #[must_use]
    pub const fn new() -> Self {
        Self { errors: Vec::new() }
    }

    /// Create a list holding one violation.
    #[must_use]
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    /// Record a violation.
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Recorded violations, in rule order.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Whether a violation was recorded for `field`.
    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    /// `Ok(())` when empty, otherwise `Err(self)`.
    ///
    /// # Errors
    ///
    /// Returns the collected violations if any were recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Shape rules: name and room lengths, and a start date that is not in the past.
///
/// # Errors
///
/// Returns every violated rule at once.
pub fn validate_request_fields(
    request: &ReservationRequest,
    today: NaiveDate,
) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    let name_len = request.customer_name.chars().count();
    if request.customer_name.trim().is_empty() {
        errors.push("customerName", "must not be blank");
    } else if !CUSTOMER_NAME_LEN.contains(&name_len) {
        errors.push("customerName", "must be between 2 and 100 characters");
    }

    let room_len = request.room_number.chars().count();
    if request.room_number.trim().is_empty() {
        errors.push("roomNumber", "must not be blank");
    } else if !ROOM_NUMBER_LEN.contains(&room_len) {
        errors.push("roomNumber", "must be between 1 and 10 characters");
    }

    if request.start_date < today {
        errors.push("startDate", "must be today or in the future");
    }

    errors.into_result()
}

/// Stay rules, checked in order: the end date follows the start date, then the
/// stay is at most [`MAX_STAY_DAYS`] nights.
///
/// # Errors
///
/// Returns the first violated rule.
pub fn validate_stay(period: &StayPeriod) -> Result<(), ValidationErrors> {
    if period.end <= period.start {
        return Err(ValidationErrors::single(
            "endDate",
            "must be after the start date",
        ));
    }
    if period.nights() > MAX_STAY_DAYS {
        return Err(ValidationErrors::single(
            "endDate",
            format!("reservation cannot exceed {MAX_STAY_DAYS} days"),
        ));
    }
    Ok(())
}

/// Card payments need a non-blank reference; other modes ignore it.
///
/// # Errors
///
/// Returns a `paymentReference` violation for a card payment without one.
pub fn validate_payment_reference(
    mode: PaymentMode,
    reference: Option<&str>,
) -> Result<(), ValidationErrors> {
    match (mode, reference) {
        (PaymentMode::CreditCard, None) => Err(ValidationErrors::single(
            "paymentReference",
            "is required for credit card payments",
        )),
        (PaymentMode::CreditCard, Some(r)) if r.trim().is_empty() => Err(
            ValidationErrors::single("paymentReference", "must not be blank"),
        ),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::reservation::RoomSegment;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request() -> ReservationRequest {
        ReservationRequest {
            customer_name: "Grace Hopper".into(),
            room_number: "204".into(),
            start_date: date(2026, 6, 10),
            end_date: date(2026, 6, 12),
            segment: RoomSegment::Medium,
            payment_mode: PaymentMode::Cash,
            payment_reference: None,
        }
    }

    #[test]
    fn accepts_well_formed_request() {
        assert!(validate_request_fields(&request(), date(2026, 6, 1)).is_ok());
    }

    #[test]
    fn collects_every_field_violation() {
        let mut req = request();
        req.customer_name = "A".into();
        req.room_number = "   ".into();
        req.start_date = date(2026, 5, 1);

        let errors = validate_request_fields(&req, date(2026, 6, 1)).unwrap_err();
        assert_eq!(errors.errors().len(), 3);
        assert!(errors.has_field("customerName"));
        assert!(errors.has_field("roomNumber"));
        assert!(errors.has_field("startDate"));
    }

    #[test]
    fn name_length_counts_characters_not_bytes() {
        let mut req = request();
        req.customer_name = "Zoë".into();
        assert!(validate_request_fields(&req, date(2026, 6, 1)).is_ok());

        req.customer_name = "é".repeat(101);
        assert!(validate_request_fields(&req, date(2026, 6, 1)).is_err());
    }

    #[test]
    fn room_number_longer_than_ten_is_rejected() {
        let mut req = request();
        req.room_number = "12345678901".into();
        let errors = validate_request_fields(&req, date(2026, 6, 1)).unwrap_err();
        assert!(errors.has_field("roomNumber"));
    }

    #[test]
    fn start_today_is_allowed() {
        let req = request();
        assert!(validate_request_fields(&req, req.start_date).is_ok());
    }

    #[test]
    fn end_must_follow_start() {
        let same_day = StayPeriod::new(date(2026, 6, 10), date(2026, 6, 10));
        assert!(validate_stay(&same_day).is_err());

        let inverted = StayPeriod::new(date(2026, 6, 10), date(2026, 6, 9));
        assert!(validate_stay(&inverted).unwrap_err().has_field("endDate"));
    }

    #[test]
    fn thirty_nights_is_the_limit() {
        let start = date(2026, 6, 1);
        assert!(validate_stay(&StayPeriod::new(start, date(2026, 7, 1))).is_ok());
        assert!(validate_stay(&StayPeriod::new(start, date(2026, 7, 2))).is_err());
    }

    #[test]
    fn card_payment_requires_reference() {
        assert!(validate_payment_reference(PaymentMode::CreditCard, None).is_err());
        assert!(validate_payment_reference(PaymentMode::CreditCard, Some("  ")).is_err());
        assert!(validate_payment_reference(PaymentMode::CreditCard, Some("REF-1")).is_ok());
        assert!(validate_payment_reference(PaymentMode::Cash, None).is_ok());
        assert!(validate_payment_reference(PaymentMode::BankTransfer, Some("")).is_ok());
    }

    #[test]
    fn display_joins_violations() {
        let mut errors = ValidationErrors::new();
        errors.push("customerName", "must not be blank");
        errors.push("roomNumber", "must not be blank");
        assert_eq!(
            errors.to_string(),
            "customerName: must not be blank; roomNumber: must not be blank"
        );
    }
}
