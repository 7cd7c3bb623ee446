//! # Room Reservation Core
//!
//! Domain types and collaborator traits for the room reservation lifecycle.
//!
//! A reservation is admitted once, with an initial status chosen by its payment
//! mode, and is mutated at most once afterwards: either confirmed by an inbound
//! bank-transfer event or cancelled by the expiry sweep.
//!
//! ## Contents
//!
//! - [`reservation`]: the [`Reservation`] record, its identifier and enums
//! - [`validation`]: explicit field and stay-period rules
//! - [`store`]: the [`ReservationStore`] repository trait
//! - [`payment`]: the outbound payment authority contract
//! - [`payment_event`]: decoding of inbound payment-update events
//! - [`handler`]: the inbound message handler seam
//! - [`error`]: the admission error taxonomy
//! - [`environment`]: injected dependencies such as the [`Clock`](environment::Clock)

pub use chrono::{DateTime, NaiveDate, Utc};

pub mod error;
pub mod handler;
pub mod payment;
pub mod payment_event;
pub mod reservation;
pub mod store;
pub mod validation;

pub use error::ReservationError;
pub use handler::{HandlerError, MessageHandler};
pub use payment::{PaymentStatus, PaymentTransport, TransportError};
pub use payment_event::{EventDecoder, MessageFormatError, PaymentUpdateEvent};
pub use reservation::{
    PaymentMode, Reservation, ReservationId, ReservationRequest, ReservationStatus,
    RoomSegment, StayPeriod,
};
pub use store::{ReservationStore, StoreError};
pub use validation::{FieldError, ValidationErrors};

/// Environment module - Injected dependencies
pub mod environment {
    use chrono::{DateTime, NaiveDate, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Admission compares start dates against "today", and the sweeper derives its
    /// threshold from it, so both take the clock as a dependency.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Get the current calendar date (UTC)
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }
    }

    /// Wall clock used in production.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
