//! Resilient payment verification.
//!
//! [`PaymentVerifier`] layers three policies over a [`PaymentTransport`]:
//!
//! ```text
//! retry (transient errors only)
//!   └── circuit breaker (4xx answers do not count as failures)
//!         └── per-attempt timeout
//!               └── transport
//! ```
//!
//! A breaker rejection is never retried, so an open circuit fails the
//! verification immediately without reaching the authority.

use crate::config::PaymentServiceConfig;
use crate::metrics;
use room_reservation_core::{PaymentStatus, PaymentTransport, TransportError};
use room_reservation_runtime::circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, State,
};
use room_reservation_runtime::retry::{RetryPolicy, retry_if};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Name of the breaker, used in logs and metric labels.
pub const BREAKER_NAME: &str = "payment-authority";

/// Why no verdict was obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The authority refused the reference (4xx).
    #[error("Invalid or unknown payment reference")]
    InvalidReference,

    /// The authority could not be consulted.
    #[error("Payment service unavailable: {0}")]
    ServiceUnavailable(String),
}

type AttemptError = CircuitBreakerError<TransportError>;

/// Verifies card payments against the payment authority.
pub struct PaymentVerifier {
    transport: Arc<dyn PaymentTransport>,
    retry: RetryPolicy,
    breaker: CircuitBreaker,
    attempt_timeout: Duration,
}

impl PaymentVerifier {
    /// Assemble a verifier from explicit policies.
    #[must_use]
    pub fn new(
        transport: Arc<dyn PaymentTransport>,
        retry: RetryPolicy,
        breaker: CircuitBreakerConfig,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            retry,
            breaker: CircuitBreaker::new(BREAKER_NAME, breaker),
            attempt_timeout,
        }
    }

    /// Assemble a verifier from configuration.
    #[must_use]
    pub fn from_config(transport: Arc<dyn PaymentTransport>, config: &PaymentServiceConfig) -> Self {
        let retry = RetryPolicy::builder()
            .max_attempts(config.max_attempts)
            .initial_delay(config.initial_backoff)
            .build();
        let breaker = CircuitBreakerConfig::builder()
            .failure_threshold(config.failure_threshold)
            .timeout(config.open_cooldown)
            .half_open_max_calls(config.half_open_probes)
            .success_threshold(config.half_open_probes)
            .build();
        Self::new(transport, retry, breaker, config.attempt_timeout())
    }

    /// Current breaker state.
    pub async fn breaker_state(&self) -> State {
        self.breaker.state().await
    }

    /// Ask the authority for the verdict on `reference`.
    ///
    /// # Errors
    ///
    /// - [`VerificationError::InvalidReference`] if the authority answered 4xx.
    /// - [`VerificationError::ServiceUnavailable`] for everything else: 5xx or
    ///   network failures after the retry budget, an unreadable answer, or an
    ///   open circuit.
    #[tracing::instrument(skip_all)]
    pub async fn verify(&self, reference: &str) -> Result<PaymentStatus, VerificationError> {
        let started = Instant::now();

        let result = retry_if(
            &self.retry,
            "payment_verification",
            || self.attempt(reference),
            |e: &AttemptError| matches!(e, CircuitBreakerError::Inner(t) if t.is_transient()),
        )
        .await;

        let (label, outcome) = match result {
            Ok(PaymentStatus::Confirmed) => ("confirmed", Ok(PaymentStatus::Confirmed)),
            Ok(PaymentStatus::Rejected) => ("rejected", Ok(PaymentStatus::Rejected)),
            Err(CircuitBreakerError::Inner(TransportError::Client { status })) => {
                tracing::info!(status, "Payment authority refused the reference");
                ("invalid_reference", Err(VerificationError::InvalidReference))
            }
            Err(CircuitBreakerError::Open) => {
                tracing::warn!("Payment authority circuit is open, failing fast");
                (
                    "unavailable",
                    Err(VerificationError::ServiceUnavailable(
                        "circuit breaker is open".to_owned(),
                    )),
                )
            }
            Err(CircuitBreakerError::Inner(error)) => {
                tracing::warn!(error = %error, "Payment authority unavailable");
                ("unavailable", Err(VerificationError::ServiceUnavailable(error.to_string())))
            }
        };

        metrics::record_verification(label, started.elapsed());
        outcome
    }

    async fn attempt(&self, reference: &str) -> Result<PaymentStatus, AttemptError> {
        self.breaker
            .call_with(
                || async {
                    tokio::time::timeout(
                        self.attempt_timeout,
                        self.transport.check_status(reference.to_owned()),
                    )
                    .await
                    .unwrap_or(Err(TransportError::Timeout))
                },
                |e: &TransportError| !e.is_client_error(),
            )
            .await
    }
}
