//! Axum plumbing for the room reservation HTTP API.
//!
//! Domain-free building blocks shared by the HTTP surface:
//!
//! - [`AppError`]: JSON error responses with a stable `code` and optional
//!   field-level details.
//! - [`JsonBody`]: a `Json` extractor whose rejections are [`AppError`]s, so a
//!   malformed body gets the same error shape as a failed validation.
//! - [`handlers`]: liveness and Prometheus scrape endpoints.
//! - [`middleware`]: request tracing.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::post};
//! use room_reservation_web::{AppError, JsonBody, middleware::http_trace_layer};
//!
//! async fn create(JsonBody(body): JsonBody<CreateRequest>) -> Result<Created, AppError> {
//!     // ...
//! }
//!
//! let app = Router::new()
//!     .route("/reservations", post(create))
//!     .layer(http_trace_layer());
//! ```

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::JsonBody;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
