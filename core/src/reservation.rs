//! The reservation record and its value types.

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of characters in a reservation identifier.
pub const RESERVATION_ID_LEN: usize = 8;

const ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Error returned when a string is not a well-formed reservation id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid reservation id '{0}': expected 8 uppercase letters or digits")]
pub struct InvalidReservationId(pub String);

/// External reference of a reservation: 8 uppercase alphanumeric characters.
///
/// Payment events and API callers refer to reservations by this value, so the
/// format is checked on every construction path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReservationId(String);

impl ReservationId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let id = (0..RESERVATION_ID_LEN)
            .map(|_| char::from(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())]))
            .collect();
        Self(id)
    }

    /// Parse a candidate identifier, rejecting anything outside `^[A-Z0-9]{8}$`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidReservationId`] if the candidate has the wrong length or
    /// contains characters other than uppercase ASCII letters and digits.
    pub fn parse(candidate: &str) -> Result<Self, InvalidReservationId> {
        if Self::is_well_formed(candidate) {
            Ok(Self(candidate.to_owned()))
        } else {
            Err(InvalidReservationId(candidate.to_owned()))
        }
    }

    /// Check the identifier format without allocating.
    #[must_use]
    pub fn is_well_formed(candidate: &str) -> bool {
        candidate.len() == RESERVATION_ID_LEN
            && candidate
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ReservationId {
    type Err = InvalidReservationId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ReservationId {
    type Error = InvalidReservationId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if Self::is_well_formed(&value) {
            Ok(Self(value))
        } else {
            Err(InvalidReservationId(value))
        }
    }
}

impl From<ReservationId> for String {
    fn from(id: ReservationId) -> Self {
        id.0
    }
}

/// Error returned when parsing one of the reservation enums from its wire name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} '{value}'")]
pub struct UnknownVariant {
    /// Enum being parsed
    pub kind: &'static str,
    /// Rejected input
    pub value: String,
}

macro_rules! wire_enum {
    ($kind:literal, $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $name {
            /// Wire and storage name of this variant.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_owned() }),
                }
            }
        }
    };
}

/// How the guest pays; decides the confirmation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMode {
    /// Paid at the desk, confirmed immediately
    Cash,
    /// Confirmed later by an inbound payment-update event
    BankTransfer,
    /// Verified synchronously with the payment authority
    CreditCard,
}

wire_enum!("payment mode", PaymentMode {
    Cash => "CASH",
    BankTransfer => "BANK_TRANSFER",
    CreditCard => "CREDIT_CARD",
});

/// Lifecycle status of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Admitted, waiting for payment
    PendingPayment,
    /// Paid (terminal)
    Confirmed,
    /// Expired unpaid (terminal)
    Cancelled,
}

wire_enum!("reservation status", ReservationStatus {
    PendingPayment => "PENDING_PAYMENT",
    Confirmed => "CONFIRMED",
    Cancelled => "CANCELLED",
});

impl ReservationStatus {
    /// Statuses that occupy a room and count toward the no-overlap rule.
    pub const ACTIVE: [Self; 2] = [Self::PendingPayment, Self::Confirmed];

    /// Whether a reservation in this status blocks its room.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::PendingPayment | Self::Confirmed)
    }

    /// Whether no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Confirmed | Self::Cancelled)
    }
}

/// Room size tag. Carried through; not checked against inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomSegment {
    /// Single room
    Small,
    /// Double room
    Medium,
    /// Family room
    Large,
    /// Suite
    ExtraLarge,
}

wire_enum!("room segment", RoomSegment {
    Small => "SMALL",
    Medium => "MEDIUM",
    Large => "LARGE",
    ExtraLarge => "EXTRA_LARGE",
});

/// A half-open stay `[start, end)`: the end date itself is not occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StayPeriod {
    /// First night
    pub start: NaiveDate,
    /// Check-out date (exclusive)
    pub end: NaiveDate,
}

impl StayPeriod {
    /// Create a period. Ordering is checked by validation, not here.
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Half-open overlap test. Periods that share only an edge do not overlap.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Number of nights; zero or negative for an inverted period.
    #[must_use]
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Incoming request to book a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRequest {
    /// Guest name
    pub customer_name: String,
    /// Room being booked
    pub room_number: String,
    /// First night
    pub start_date: NaiveDate,
    /// Check-out date
    pub end_date: NaiveDate,
    /// Room size tag
    pub segment: RoomSegment,
    /// Payment path
    pub payment_mode: PaymentMode,
    /// Card payment reference, required for [`PaymentMode::CreditCard`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
}

impl ReservationRequest {
    /// Requested stay.
    #[must_use]
    pub const fn period(&self) -> StayPeriod {
        StayPeriod::new(self.start_date, self.end_date)
    }
}

/// A persisted reservation.
///
/// Records are plain values: status changes produce a new record through
/// [`Reservation::with_status`], and the store applies them conditionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    /// External reference
    pub id: ReservationId,
    /// Guest name
    pub customer_name: String,
    /// Room being booked
    pub room_number: String,
    /// First night
    pub start_date: NaiveDate,
    /// Check-out date
    pub end_date: NaiveDate,
    /// Room size tag
    pub segment: RoomSegment,
    /// Payment path
    pub payment_mode: PaymentMode,
    /// Card payment reference
    pub payment_reference: Option<String>,
    /// Lifecycle status
    pub status: ReservationStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Build a new reservation from an admitted request, with a fresh id and both
    /// timestamps set to `now`.
    #[must_use]
    pub fn admit(request: ReservationRequest, status: ReservationStatus, now: DateTime<Utc>) -> Self {
        Self {
            id: ReservationId::generate(),
            customer_name: request.customer_name,
            room_number: request.room_number,
            start_date: request.start_date,
            end_date: request.end_date,
            segment: request.segment,
            payment_mode: request.payment_mode,
            payment_reference: request.payment_reference,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Same reservation under a different id (used after an id collision).
    #[must_use]
    pub fn with_id(self, id: ReservationId) -> Self {
        Self { id, ..self }
    }

    /// Same reservation with a new status and `updated_at`.
    #[must_use]
    pub fn with_status(self, status: ReservationStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            updated_at: at,
            ..self
        }
    }

    /// Booked stay.
    #[must_use]
    pub const fn period(&self) -> StayPeriod {
        StayPeriod::new(self.start_date, self.end_date)
    }

    /// Whether this reservation occupies `room_number` during any part of `period`.
    #[must_use]
    pub fn blocks(&self, room_number: &str, period: &StayPeriod) -> bool {
        self.status.is_active() && self.room_number == room_number && self.period().overlaps(period)
    }

    /// Whether this reservation is still waiting for a bank transfer.
    #[must_use]
    pub fn is_awaiting_bank_transfer(&self) -> bool {
        self.status == ReservationStatus::PendingPayment
            && self.payment_mode == PaymentMode::BankTransfer
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn generated_ids_are_well_formed() {
        for _ in 0..100 {
            let id = ReservationId::generate();
            assert!(ReservationId::is_well_formed(id.as_str()), "bad id {id}");
        }
    }

    #[test]
    fn parse_rejects_lowercase_and_wrong_length() {
        assert!(ReservationId::parse("AB12CD34").is_ok());
        assert!(ReservationId::parse("ab12cd34").is_err());
        assert!(ReservationId::parse("AB12CD3").is_err());
        assert!(ReservationId::parse("AB12CD345").is_err());
        assert!(ReservationId::parse("AB12-D34").is_err());
        assert!(ReservationId::parse("").is_err());
    }

    #[test]
    fn reservation_id_deserialization_checks_format() {
        let ok: Result<ReservationId, _> = serde_json::from_str("\"ZZ99AA00\"");
        assert!(ok.is_ok());
        let bad: Result<ReservationId, _> = serde_json::from_str("\"zz99aa00\"");
        assert!(bad.is_err());
    }

    #[test]
    fn enums_use_screaming_snake_case_on_the_wire() {
        assert_eq!(
            serde_json::to_string(&PaymentMode::BankTransfer).unwrap(),
            "\"BANK_TRANSFER\""
        );
        assert_eq!(
            serde_json::to_string(&RoomSegment::ExtraLarge).unwrap(),
            "\"EXTRA_LARGE\""
        );
        assert_eq!(
            "PENDING_PAYMENT".parse::<ReservationStatus>().unwrap(),
            ReservationStatus::PendingPayment
        );
        assert!("pending".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn touching_periods_do_not_overlap() {
        let first = StayPeriod::new(date(2026, 5, 1), date(2026, 5, 4));
        let second = StayPeriod::new(date(2026, 5, 4), date(2026, 5, 6));
        assert!(!first.overlaps(&second));
        assert!(!second.overlaps(&first));
    }

    #[test]
    fn contained_period_overlaps() {
        let outer = StayPeriod::new(date(2026, 5, 1), date(2026, 5, 10));
        let inner = StayPeriod::new(date(2026, 5, 3), date(2026, 5, 4));
        assert!(outer.overlaps(&inner));
        assert!(inner.overlaps(&outer));
    }

    #[test]
    fn cancelled_reservation_does_not_block() {
        let request = ReservationRequest {
            customer_name: "Ada Lovelace".into(),
            room_number: "101".into(),
            start_date: date(2026, 5, 1),
            end_date: date(2026, 5, 3),
            segment: RoomSegment::Small,
            payment_mode: PaymentMode::BankTransfer,
            payment_reference: None,
        };
        let now = Utc::now();
        let period = request.period();
        let pending = Reservation::admit(request, ReservationStatus::PendingPayment, now);
        assert!(pending.blocks("101", &period));
        assert!(!pending.blocks("102", &period));

        let cancelled = pending.with_status(ReservationStatus::Cancelled, now);
        assert!(!cancelled.blocks("101", &period));
        assert!(!cancelled.is_awaiting_bank_transfer());
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric(a in 0i64..60, a_len in 1i64..31, b in 0i64..60, b_len in 1i64..31) {
            let base = date(2026, 1, 1);
            let first = StayPeriod::new(base + chrono::Days::new(a as u64), base + chrono::Days::new((a + a_len) as u64));
            let second = StayPeriod::new(base + chrono::Days::new(b as u64), base + chrono::Days::new((b + b_len) as u64));
            prop_assert_eq!(first.overlaps(&second), second.overlaps(&first));
        }

        #[test]
        fn overlap_matches_shared_night(a in 0i64..60, a_len in 1i64..31, b in 0i64..60, b_len in 1i64..31) {
            // Two stays overlap exactly when some night belongs to both.
            let shares_night = (a..a + a_len).any(|night| night >= b && night < b + b_len);
            let base = date(2026, 1, 1);
            let first = StayPeriod::new(base + chrono::Days::new(a as u64), base + chrono::Days::new((a + a_len) as u64));
            let second = StayPeriod::new(base + chrono::Days::new(b as u64), base + chrono::Days::new((b + b_len) as u64));
            prop_assert_eq!(first.overlaps(&second), shares_night);
        }
    }
}
