//! Request and reservation builders anchored on [`test_clock`](crate::test_clock).

use crate::mocks::test_clock;
use chrono::{Days, NaiveDate};
use room_reservation_core::environment::Clock;
use room_reservation_core::{
    PaymentMode, Reservation, ReservationRequest, ReservationStatus, RoomSegment,
};

/// Build a calendar date.
///
/// # Panics
///
/// Panics if the date does not exist.
#[must_use]
#[allow(clippy::expect_used)]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("fixture date should exist")
}

/// "Today" according to [`test_clock`].
#[must_use]
pub fn today() -> NaiveDate {
    test_clock().today()
}

/// `days` after [`today`].
#[must_use]
pub fn days_from_today(days: u64) -> NaiveDate {
    today() + Days::new(days)
}

/// Builder for [`ReservationRequest`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: ReservationRequest,
}

/// Start a request paid with `mode`: room 101, three nights starting a week
/// from [`today`]. Card requests get a reference.
#[must_use]
pub fn request(mode: PaymentMode) -> RequestBuilder {
    RequestBuilder {
        request: ReservationRequest {
            customer_name: "Ada Lovelace".to_owned(),
            room_number: "101".to_owned(),
            start_date: days_from_today(7),
            end_date: days_from_today(10),
            segment: RoomSegment::Medium,
            payment_mode: mode,
            payment_reference: (mode == PaymentMode::CreditCard).then(|| "CARD-REF-0001".to_owned()),
        },
    }
}

impl RequestBuilder {
    /// Set the room.
    #[must_use]
    pub fn room(mut self, room_number: &str) -> Self {
        room_number.clone_into(&mut self.request.room_number);
        self
    }

    /// Set the guest name.
    #[must_use]
    pub fn customer(mut self, name: &str) -> Self {
        name.clone_into(&mut self.request.customer_name);
        self
    }

    /// Set both dates.
    #[must_use]
    pub const fn dates(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.request.start_date = start;
        self.request.end_date = end;
        self
    }

    /// Start `offset` days from today and stay `nights` nights.
    #[must_use]
    pub fn stay(self, offset: u64, nights: u64) -> Self {
        let start = days_from_today(offset);
        self.dates(start, start + Days::new(nights))
    }

    /// Set or clear the payment reference.
    #[must_use]
    pub fn payment_reference(mut self, reference: Option<&str>) -> Self {
        self.request.payment_reference = reference.map(str::to_owned);
        self
    }

    /// Finish the request.
    #[must_use]
    pub fn build(self) -> ReservationRequest {
        self.request
    }
}

/// A stored reservation created at [`test_clock`] time.
#[must_use]
pub fn reservation(
    room_number: &str,
    start: NaiveDate,
    end: NaiveDate,
    mode: PaymentMode,
    status: ReservationStatus,
) -> Reservation {
    let request = request(mode).room(room_number).dates(start, end).build();
    Reservation::admit(request, status, test_clock().now())
}

/// A bank-transfer reservation waiting for payment.
#[must_use]
pub fn pending_bank_transfer(room_number: &str, start: NaiveDate, nights: u64) -> Reservation {
    reservation(
        room_number,
        start,
        start + Days::new(nights),
        PaymentMode::BankTransfer,
        ReservationStatus::PendingPayment,
    )
}
