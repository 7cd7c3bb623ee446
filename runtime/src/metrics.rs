//! Prometheus metrics for observability and monitoring.
//!
//! This module installs the global Prometheus recorder and provides recorders
//! for the runtime components:
//! - Circuit breaker calls and state transitions
//! - Retry attempts
//! - Message consumer deliveries
//!
//! Business metrics are recorded by the service crate through the same global
//! recorder.
//!
//! # Example
//!
//! ```rust,no_run
//! use room_reservation_runtime::metrics::PrometheusMetrics;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut metrics = PrometheusMetrics::new();
//! metrics.install()?;
//!
//! // Serve `metrics.render()` from a `/metrics` route.
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;
use thiserror::Error;

// Re-export metrics macros for use in other crates
pub use metrics::{counter, gauge, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Handle on the process-wide Prometheus recorder.
#[derive(Default)]
pub struct PrometheusMetrics {
    handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics")
            .field("installed", &self.handle.is_some())
            .finish()
    }
}

impl PrometheusMetrics {
    /// Create an uninstalled recorder handle.
    #[must_use]
    pub const fn new() -> Self {
        Self { handle: None }
    }

    /// Describe all runtime metrics and install the Prometheus recorder.
    ///
    /// # Errors
    ///
    /// Returns error if the exporter cannot be built or installed.
    ///
    /// # Note
    ///
    /// Only one recorder can be installed per process. A second installation
    /// (common in tests) is logged and ignored, leaving this handle empty.
    pub fn install(&mut self) -> Result<(), MetricsError> {
        let builder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        match builder.install_recorder() {
            Ok(handle) => {
                register_metrics();
                self.handle = Some(handle);
                tracing::info!("Prometheus metrics recorder installed");
                Ok(())
            }
            Err(e) => {
                let err_msg = e.to_string();
                if err_msg.contains("already") {
                    tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
                    Ok(())
                } else {
                    Err(MetricsError::Install(err_msg))
                }
            }
        }
    }

    /// Get the recorder handle, if this instance installed it.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this instance did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

fn register_metrics() {
    // Circuit Breaker Metrics
    describe_gauge!(
        "circuit_breaker_state",
        "Circuit breaker state (0=closed, 1=half_open, 2=open)"
    );
    describe_counter!("circuit_breaker_calls_total", "Calls submitted to a circuit breaker");
    describe_counter!(
        "circuit_breaker_successes_total",
        "Calls that reached the dependency and were not counted as failures"
    );
    describe_counter!(
        "circuit_breaker_failures_total",
        "Calls counted as dependency failures"
    );
    describe_counter!(
        "circuit_breaker_rejections_total",
        "Calls rejected because the circuit was open"
    );
    describe_counter!(
        "circuit_breaker_transitions_total",
        "Circuit breaker state transitions"
    );

    // Retry Metrics
    describe_counter!("retry_attempts_total", "Retries scheduled after a failed attempt");
    describe_counter!("retry_successes_total", "Operations that succeeded after retrying");
    describe_counter!("retry_exhausted_total", "Operations that failed after every attempt");

    // Consumer Metrics
    describe_counter!("consumer_messages_received_total", "Messages received from the broker");
    describe_counter!(
        "consumer_messages_acknowledged_total",
        "Messages processed and committed"
    );
    describe_counter!(
        "consumer_messages_dead_lettered_total",
        "Messages routed to the dead-letter topic"
    );
    describe_histogram!(
        "consumer_handle_duration_seconds",
        "Time spent delivering one message, retries included"
    );
}

/// Circuit breaker metrics recorder.
pub struct CircuitBreakerMetrics;

impl CircuitBreakerMetrics {
    /// Record circuit breaker state.
    ///
    /// 0 = Closed, 1 = `HalfOpen`, 2 = Open
    pub fn record_state(breaker: &str, state: f64) {
        gauge!("circuit_breaker_state", "breaker" => breaker.to_owned()).set(state);
    }

    /// Record a state transition.
    pub fn record_transition(breaker: &str, from: &'static str, to: &'static str) {
        counter!(
            "circuit_breaker_transitions_total",
            "breaker" => breaker.to_owned(),
            "from" => from,
            "to" => to
        )
        .increment(1);
    }

    /// Record a call attempt.
    pub fn record_call(breaker: &str) {
        counter!("circuit_breaker_calls_total", "breaker" => breaker.to_owned()).increment(1);
    }

    /// Record a successful call.
    pub fn record_success(breaker: &str) {
        counter!("circuit_breaker_successes_total", "breaker" => breaker.to_owned()).increment(1);
    }

    /// Record a failed call.
    pub fn record_failure(breaker: &str) {
        counter!("circuit_breaker_failures_total", "breaker" => breaker.to_owned()).increment(1);
    }

    /// Record a rejected call (circuit open).
    pub fn record_rejection(breaker: &str) {
        counter!("circuit_breaker_rejections_total", "breaker" => breaker.to_owned()).increment(1);
    }
}

/// Retry metrics recorder.
pub struct RetryMetrics;

impl RetryMetrics {
    /// Record a scheduled retry.
    pub fn record_attempt(operation: &str) {
        counter!("retry_attempts_total", "operation" => operation.to_owned()).increment(1);
    }

    /// Record a success after at least one retry.
    pub fn record_success(operation: &str) {
        counter!("retry_successes_total", "operation" => operation.to_owned()).increment(1);
    }

    /// Record exhausted retries.
    pub fn record_exhausted(operation: &str) {
        counter!("retry_exhausted_total", "operation" => operation.to_owned()).increment(1);
    }
}

/// Message consumer metrics recorder.
pub struct ConsumerMetrics;

impl ConsumerMetrics {
    /// Record a message taken off the broker.
    pub fn record_received(topic: &str) {
        counter!("consumer_messages_received_total", "topic" => topic.to_owned()).increment(1);
    }

    /// Record a processed and committed message.
    pub fn record_acknowledged(topic: &str, duration: Duration) {
        counter!("consumer_messages_acknowledged_total", "topic" => topic.to_owned()).increment(1);
        histogram!("consumer_handle_duration_seconds", "topic" => topic.to_owned())
            .record(duration.as_secs_f64());
    }

    /// Record a message routed to the dead-letter topic.
    pub fn record_dead_lettered(topic: &str, duration: Duration) {
        counter!("consumer_messages_dead_lettered_total", "topic" => topic.to_owned()).increment(1);
        histogram!("consumer_handle_duration_seconds", "topic" => topic.to_owned())
            .record(duration.as_secs_f64());
    }
}
