//! # Room Reservation Testing
//!
//! Test doubles and fixtures shared by the room reservation crates.
//!
//! This crate provides:
//! - [`FixedClock`]: deterministic time
//! - [`InMemoryReservationStore`]: atomic in-memory store with failure injection
//! - [`ScriptedTransport`]: payment authority double with scripted answers
//! - [`fixtures`]: request and reservation builders
//!
//! ## Example
//!
//! ```ignore
//! use room_reservation_testing::{InMemoryReservationStore, ScriptedTransport, fixtures, test_clock};
//!
//! #[tokio::test]
//! async fn cash_is_confirmed() {
//!     let store = Arc::new(InMemoryReservationStore::new());
//!     let controller = admission_controller(store.clone(), ScriptedTransport::confirming(), test_clock());
//!
//!     let admitted = controller.admit(fixtures::request(PaymentMode::Cash).build()).await?;
//!     assert_eq!(admitted.status, ReservationStatus::Confirmed);
//! }
//! ```

use chrono::{DateTime, Utc};
use room_reservation_core::environment::Clock;

pub mod fixtures;
pub mod payment;
pub mod store;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use room_reservation_testing::mocks::FixedClock;
    /// use room_reservation_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2026-03-02 09:30:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2026-03-02T09:30:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock};
pub use payment::ScriptedTransport;
pub use store::InMemoryReservationStore;
