//! # Room Reservation Service
//!
//! Lifecycle of a room reservation, from submission to a terminal state.
//!
//! - [`admission`]: validation, conflict detection, card verification and
//!   atomic creation
//! - [`payment_verifier`]: retry, circuit breaker and timeout around the
//!   payment authority, with [`http_transport`] as the production transport
//! - [`confirmation`]: idempotent confirmation of bank transfers from
//!   payment-update events
//! - [`sweeper`]: periodic cancellation of unpaid bank transfers
//! - [`api`] and [`server`]: the HTTP surface
//! - [`app`]: process wiring
//!
//! ## Example
//!
//! ```ignore
//! use room_reservation_service::{Config, ReservationApp};
//! use room_reservation_runtime::metrics::PrometheusMetrics;
//!
//! let config = Config::from_env()?;
//! let app = ReservationApp::new(config, PrometheusMetrics::new()).await?;
//! app.run().await?;
//! ```

pub mod admission;
pub mod api;
pub mod app;
pub mod config;
pub mod confirmation;
pub mod http_transport;
pub mod metrics;
pub mod overlap;
pub mod payment_verifier;
pub mod server;
pub mod sweeper;

pub use admission::{Admission, AdmissionController};
pub use app::ReservationApp;
pub use config::{Config, ConfigError};
pub use confirmation::{ConfirmationError, ConfirmationHandler, ConfirmationOutcome};
pub use http_transport::HttpPaymentTransport;
pub use overlap::OverlapDetector;
pub use payment_verifier::{PaymentVerifier, VerificationError};
pub use sweeper::{ExpirySweeper, SweepError, SweepReport};
