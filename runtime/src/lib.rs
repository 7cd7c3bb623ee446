//! # Room Reservation Runtime
//!
//! Resilience and observability building blocks shared by the service crates.
//!
//! ## Components
//!
//! - **Retry**: exponential backoff with a retryability predicate
//! - **Circuit breaker**: fail fast while a dependency is down, probe it after a cool-down
//! - **Metrics**: Prometheus recorder installation and framework-level recorders
//!
//! ## Example
//!
//! ```rust,no_run
//! use room_reservation_runtime::circuit_breaker::{
//!     CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError,
//! };
//! use room_reservation_runtime::retry::{RetryPolicy, retry_if};
//!
//! # async fn example() {
//! let breaker = CircuitBreaker::new("payments", CircuitBreakerConfig::default());
//! let policy = RetryPolicy::default();
//!
//! let result = retry_if(
//!     &policy,
//!     "payments",
//!     || breaker.call(|| async { Ok::<_, String>(42) }),
//!     |err: &CircuitBreakerError<String>| !err.is_open(),
//! )
//! .await;
//! # let _ = result;
//! # }
//! ```

/// Retry logic with exponential backoff
pub mod retry;

/// Circuit breaker pattern for preventing cascading failures
pub mod circuit_breaker;

/// Prometheus metrics for observability
pub mod metrics;
