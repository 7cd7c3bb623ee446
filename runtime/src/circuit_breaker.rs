//! Circuit breaker pattern for preventing cascading failures.
//!
//! A circuit breaker monitors calls to a dependency and "opens" (stops allowing
//! requests) after too many consecutive failures, so callers fail fast instead of
//! piling up on timeouts.
//!
//! # States
//!
//! - **Closed**: Normal operation. Requests pass through. Failures are counted.
//! - **Open**: Requests are rejected immediately until the cool-down expires.
//! - **HalfOpen**: A limited number of probe requests are let through. Enough
//!   successful probes close the circuit; a probe that fails or is cancelled
//!   reopens it.
//!
//! Not every error is a failure of the dependency. [`CircuitBreaker::call_with`]
//! takes a classifier so that, for example, a 4xx answer passes through without
//! counting against the circuit.
//!
//! # Example
//!
//! ```rust
//! use room_reservation_runtime::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let config = CircuitBreakerConfig::builder()
//!     .failure_threshold(5)
//!     .timeout(Duration::from_secs(30))
//!     .half_open_max_calls(1)
//!     .build();
//!
//! let breaker = CircuitBreaker::new("payment-authority", config);
//!
//! match breaker.call(|| async { Ok::<_, String>(42) }).await {
//!     Ok(result) => println!("Success: {result}"),
//!     Err(e) => println!("Failed: {e}"),
//! }
//! # }
//! ```

use crate::metrics::CircuitBreakerMetrics as BreakerRecorder;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening the circuit
    pub failure_threshold: usize,
    /// Cool-down spent in Open before probing with `HalfOpen`
    pub timeout: Duration,
    /// Number of successful probes in `HalfOpen` before closing the circuit
    pub success_threshold: usize,
    /// Maximum number of probes in flight while `HalfOpen`
    pub half_open_max_calls: usize,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub const fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder {
            failure_threshold: 5,
            timeout: Duration::from_secs(30),
            success_threshold: 1,
            half_open_max_calls: 1,
        }
    }
}

/// Builder for [`CircuitBreakerConfig`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: usize,
    timeout: Duration,
    success_threshold: usize,
    half_open_max_calls: usize,
}

impl CircuitBreakerConfigBuilder {
    /// Circuit opens after this many consecutive failures.
    #[must_use]
    pub const fn failure_threshold(mut self, threshold: usize) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// How long to stay Open before trying `HalfOpen`.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = duration;
        self
    }

    /// Number of successful probes needed to close the circuit.
    #[must_use]
    pub const fn success_threshold(mut self, threshold: usize) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Number of probes allowed in flight while `HalfOpen`.
    #[must_use]
    pub const fn half_open_max_calls(mut self, calls: usize) -> Self {
        self.half_open_max_calls = calls;
        self
    }

    /// Build the configuration.
    ///
    /// Thresholds are clamped to at least one, and the success threshold never
    /// exceeds the number of probes that may be admitted.
    #[must_use]
    pub fn build(self) -> CircuitBreakerConfig {
        let half_open_max_calls = self.half_open_max_calls.max(1);
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold.max(1),
            timeout: self.timeout,
            success_threshold: self.success_threshold.clamp(1, half_open_max_calls),
            half_open_max_calls,
        }
    }
}

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Circuit is closed, requests pass through normally
    Closed,
    /// Circuit is open, requests fail immediately
    Open,
    /// Circuit is half-open, testing if the dependency recovered
    HalfOpen,
}

impl State {
    /// Gauge value exported for this state.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Closed => 0.0,
            Self::HalfOpen => 1.0,
            Self::Open => 2.0,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Errors from circuit breaker operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, request rejected without calling the operation
    #[error("Circuit breaker is open")]
    Open,
    /// Operation failed
    #[error("Operation failed: {0}")]
    Inner(E),
}

impl<E> CircuitBreakerError<E> {
    /// Whether the call was rejected by the breaker itself.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// The operation's own error, if the operation ran.
    #[must_use]
    pub const fn inner(&self) -> Option<&E> {
        match self {
            Self::Open => None,
            Self::Inner(e) => Some(e),
        }
    }
}

/// How a call was let through.
#[derive(Debug)]
enum Permit {
    Normal,
    Probe(ProbeGuard),
}

impl Permit {
    /// Mark the call as settled, returning the half-open epoch of a probe.
    fn settle(self) -> Option<u64> {
        match self {
            Self::Normal => None,
            Self::Probe(mut probe) => {
                probe.settled = true;
                Some(probe.epoch)
            }
        }
    }
}

/// Half-open slot held by a probe call.
///
/// Dropping it unsettled means the calling future was cancelled mid-probe: the
/// slot is released and the circuit reopens with a fresh cool-down.
#[derive(Debug)]
struct ProbeGuard {
    breaker: CircuitBreaker,
    epoch: u64,
    settled: bool,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let released = match self.breaker.state.try_lock() {
            Ok(mut state) => {
                self.breaker.abandon_probe(&mut state, self.epoch);
                true
            }
            Err(_) => false,
        };
        if released {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let breaker = self.breaker.clone();
            let epoch = self.epoch;
            handle.spawn(async move {
                let mut state = breaker.state.lock().await;
                breaker.abandon_probe(&mut state, epoch);
            });
        }
    }
}

#[derive(Debug)]
struct CircuitBreakerState {
    state: State,
    failure_count: usize,
    success_count: usize,
    probes_in_flight: usize,
    opened_at: Option<Instant>,
    // Bumped on every Open -> HalfOpen so stale probes can be told apart.
    half_open_epoch: u64,
}

impl CircuitBreakerState {
    const fn closed() -> Self {
        Self {
            state: State::Closed,
            failure_count: 0,
            success_count: 0,
            probes_in_flight: 0,
            opened_at: None,
            half_open_epoch: 0,
        }
    }
}

/// Circuit breaker for one dependency.
///
/// Cloning shares the underlying state, so every clone sees the same circuit.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: Arc<CircuitBreakerConfig>,
    state: Arc<Mutex<CircuitBreakerState>>,
    // Metrics
    total_calls: Arc<AtomicU64>,
    total_successes: Arc<AtomicU64>,
    total_failures: Arc<AtomicU64>,
    total_rejections: Arc<AtomicU64>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker. `name` labels its logs and metrics.
    #[must_use]
    pub fn new(name: impl Into<Arc<str>>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config: Arc::new(config),
            state: Arc::new(Mutex::new(CircuitBreakerState::closed())),
            total_calls: Arc::new(AtomicU64::new(0)),
            total_successes: Arc::new(AtomicU64::new(0)),
            total_failures: Arc::new(AtomicU64::new(0)),
            total_rejections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Name used in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the current state of the circuit breaker.
    pub async fn state(&self) -> State {
        self.state.lock().await.state
    }

    /// Call an operation, counting every error as a failure.
    ///
    /// # Errors
    ///
    /// Returns `CircuitBreakerError::Open` if the circuit rejected the call.
    /// Returns `CircuitBreakerError::Inner` if the operation fails.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        self.call_with(operation, |_| true).await
    }

    /// Call an operation, counting only errors for which `is_failure` holds.
    ///
    /// Errors that are not failures are returned to the caller but count as a
    /// healthy answer from the dependency.
    ///
    /// # Errors
    ///
    /// Returns `CircuitBreakerError::Open` if the circuit rejected the call.
    /// Returns `CircuitBreakerError::Inner` if the operation fails.
    pub async fn call_with<F, Fut, T, E, P>(
        &self,
        operation: F,
        is_failure: P,
    ) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        P: FnOnce(&E) -> bool,
    {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        BreakerRecorder::record_call(&self.name);

        let Some(permit) = self.try_acquire().await else {
            self.total_rejections.fetch_add(1, Ordering::Relaxed);
            BreakerRecorder::record_rejection(&self.name);
            tracing::warn!(breaker = %self.name, "Circuit breaker is OPEN, rejecting request");
            return Err(CircuitBreakerError::Open);
        };

        match operation().await {
            Ok(result) => {
                self.on_success(permit).await;
                Ok(result)
            }
            Err(err) if is_failure(&err) => {
                self.on_failure(permit).await;
                Err(CircuitBreakerError::Inner(err))
            }
            Err(err) => {
                self.on_success(permit).await;
                Err(CircuitBreakerError::Inner(err))
            }
        }
    }

    /// Decide whether a call may go through, moving Open to `HalfOpen` once the
    /// cool-down has elapsed.
    async fn try_acquire(&self) -> Option<Permit> {
        let mut state = self.state.lock().await;

        match state.state {
            State::Closed => Some(Permit::Normal),
            State::Open => {
                let cooled_down = state
                    .opened_at
                    .is_none_or(|opened| opened.elapsed() >= self.config.timeout);
                if !cooled_down {
                    return None;
                }
                self.transition(&mut state, State::HalfOpen);
                state.success_count = 0;
                state.probes_in_flight = 1;
                state.half_open_epoch += 1;
                Some(self.probe(state.half_open_epoch))
            }
            State::HalfOpen => {
                if state.probes_in_flight < self.config.half_open_max_calls {
                    state.probes_in_flight += 1;
                    Some(self.probe(state.half_open_epoch))
                } else {
                    None
                }
            }
        }
    }

    fn probe(&self, epoch: u64) -> Permit {
        Permit::Probe(ProbeGuard {
            breaker: self.clone(),
            epoch,
            settled: false,
        })
    }

    async fn on_success(&self, permit: Permit) {
        self.total_successes.fetch_add(1, Ordering::Relaxed);
        BreakerRecorder::record_success(&self.name);

        let probe = permit.settle();
        let mut state = self.state.lock().await;
        match (state.state, probe) {
            (State::Closed, _) => {
                state.failure_count = 0;
            }
            (State::HalfOpen, Some(epoch)) if epoch == state.half_open_epoch => {
                state.probes_in_flight = state.probes_in_flight.saturating_sub(1);
                state.success_count += 1;
                if state.success_count >= self.config.success_threshold {
                    tracing::info!(
                        breaker = %self.name,
                        successes = state.success_count,
                        "Circuit breaker transitioning HALF_OPEN -> CLOSED"
                    );
                    self.close(&mut state);
                }
            }
            // A call admitted before the circuit changed state; its outcome is stale.
            _ => {}
        }
    }

    async fn on_failure(&self, permit: Permit) {
        self.total_failures.fetch_add(1, Ordering::Relaxed);
        BreakerRecorder::record_failure(&self.name);

        let probe = permit.settle();
        let mut state = self.state.lock().await;
        match (state.state, probe) {
            (State::Closed, _) => {
                state.failure_count += 1;
                if state.failure_count >= self.config.failure_threshold {
                    tracing::warn!(
                        breaker = %self.name,
                        failures = state.failure_count,
                        threshold = self.config.failure_threshold,
                        "Circuit breaker transitioning CLOSED -> OPEN"
                    );
                    self.open(&mut state);
                }
            }
            (State::HalfOpen, Some(epoch)) if epoch == state.half_open_epoch => {
                tracing::warn!(
                    breaker = %self.name,
                    "Circuit breaker transitioning HALF_OPEN -> OPEN (probe failed)"
                );
                self.open(&mut state);
            }
            _ => {}
        }
    }

    fn abandon_probe(&self, state: &mut CircuitBreakerState, epoch: u64) {
        if state.state != State::HalfOpen || state.half_open_epoch != epoch {
            return;
        }
        tracing::warn!(
            breaker = %self.name,
            "Circuit breaker transitioning HALF_OPEN -> OPEN (probe cancelled)"
        );
        self.open(state);
    }

    fn close(&self, state: &mut CircuitBreakerState) {
        self.transition(state, State::Closed);
        state.failure_count = 0;
        state.success_count = 0;
        state.probes_in_flight = 0;
        state.opened_at = None;
    }

    fn open(&self, state: &mut CircuitBreakerState) {
        self.transition(state, State::Open);
        state.opened_at = Some(Instant::now());
        state.success_count = 0;
        state.probes_in_flight = 0;
    }

    fn transition(&self, state: &mut CircuitBreakerState, to: State) {
        let from = state.state;
        state.state = to;
        BreakerRecorder::record_transition(&self.name, from.label(), to.label());
        BreakerRecorder::record_state(&self.name, to.as_gauge());
    }

    /// Get circuit breaker counters.
    #[must_use]
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics {
            total_calls: self.total_calls.load(Ordering::Relaxed),
            total_successes: self.total_successes.load(Ordering::Relaxed),
            total_failures: self.total_failures.load(Ordering::Relaxed),
            total_rejections: self.total_rejections.load(Ordering::Relaxed),
        }
    }

    /// Reset the circuit breaker to closed state.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        tracing::info!(breaker = %self.name, "Circuit breaker manually reset to CLOSED");
        self.close(&mut state);
    }
}

/// Counters for circuit breaker monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerMetrics {
    /// Total number of calls attempted
    pub total_calls: u64,
    /// Calls that reached the operation and were not counted as failures
    pub total_successes: u64,
    /// Calls counted as failures
    pub total_failures: u64,
    /// Calls rejected without reaching the operation
    pub total_rejections: u64,
}

impl CircuitBreakerMetrics {
    /// Calculate rejection rate (0.0 to 1.0).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn rejection_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.total_rejections as f64 / self.total_calls as f64
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn breaker(threshold: usize, timeout: Duration) -> CircuitBreaker {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(threshold)
            .timeout(timeout)
            .build();
        CircuitBreaker::new("test", config)
    }

    async fn fail(breaker: &CircuitBreaker) {
        let _ = breaker.call(|| async { Err::<i32, _>("boom") }).await;
    }

    #[tokio::test]
    async fn test_circuit_breaker_closed_on_success() {
        let breaker = CircuitBreaker::new("test", CircuitBreakerConfig::default());

        let result = breaker.call(|| async { Ok::<_, String>(42) }).await;

        assert_eq!(result, Ok(42));
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn test_circuit_breaker_opens_after_threshold() {
        let breaker = breaker(3, Duration::from_secs(60));

        for _ in 0..3 {
            fail(&breaker).await;
        }

        assert_eq!(breaker.state().await, State::Open);
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let breaker = breaker(3, Duration::from_secs(60));

        fail(&breaker).await;
        fail(&breaker).await;
        let _ = breaker.call(|| async { Ok::<_, &str>(1) }).await;
        fail(&breaker).await;
        fail(&breaker).await;

        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn test_open_circuit_does_not_run_operation() {
        let breaker = breaker(2, Duration::from_secs(60));
        fail(&breaker).await;
        fail(&breaker).await;

        let calls = AtomicUsize::new(0);
        let result = breaker
            .call(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(42)
            })
            .await;

        assert_eq!(result, Err(CircuitBreakerError::Open));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.metrics().total_rejections, 1);
    }

    #[tokio::test]
    async fn test_classifier_excludes_answers_from_failures() {
        let breaker = breaker(2, Duration::from_secs(60));

        for _ in 0..5 {
            let result = breaker
                .call_with(|| async { Err::<i32, _>(404_u16) }, |status| *status >= 500)
                .await;
            assert_eq!(result, Err(CircuitBreakerError::Inner(404)));
        }

        assert_eq!(breaker.state().await, State::Closed);
        assert_eq!(breaker.metrics().total_failures, 0);
    }

    #[tokio::test]
    async fn test_half_open_probe_success_closes_circuit() {
        let breaker = breaker(1, Duration::from_millis(50));
        fail(&breaker).await;
        assert_eq!(breaker.state().await, State::Open);

        tokio::time::sleep(Duration::from_millis(80)).await;

        let result = breaker.call(|| async { Ok::<_, String>(7) }).await;
        assert_eq!(result, Ok(7));
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn test_half_open_probe_failure_reopens_circuit() {
        let breaker = breaker(1, Duration::from_millis(50));
        fail(&breaker).await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        fail(&breaker).await;

        assert_eq!(breaker.state().await, State::Open);
        let result = breaker.call(|| async { Ok::<_, String>(7) }).await;
        assert_eq!(result, Err(CircuitBreakerError::Open));
    }

    #[tokio::test]
    async fn test_half_open_limits_concurrent_probes() {
        let breaker = breaker(1, Duration::from_millis(20));
        fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let probing = breaker.clone();
        let probe = tokio::spawn(async move {
            probing
                .call(|| async move {
                    let _ = release_rx.await;
                    Ok::<_, String>(1)
                })
                .await
        });

        // Let the probe take the only half-open slot.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(breaker.state().await, State::HalfOpen);

        let second = breaker.call(|| async { Ok::<_, String>(2) }).await;
        assert_eq!(second, Err(CircuitBreakerError::Open));

        release_tx.send(()).unwrap();
        assert_eq!(probe.await.unwrap(), Ok(1));
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn test_cancelled_probe_reopens_circuit() {
        let breaker = breaker(1, Duration::from_millis(20));
        fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let probing = breaker.clone();
        let probe = tokio::spawn(async move {
            probing
                .call(std::future::pending::<Result<i32, String>>)
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(breaker.state().await, State::HalfOpen);

        probe.abort();
        assert!(probe.await.unwrap_err().is_cancelled());
        assert_eq!(breaker.state().await, State::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let result = breaker.call(|| async { Ok::<_, String>(1) }).await;
        assert_eq!(result, Ok(1));
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn test_stale_probe_leaves_later_half_open_alone() {
        let config = CircuitBreakerConfig::builder()
            .failure_threshold(1)
            .timeout(Duration::from_millis(20))
            .half_open_max_calls(2)
            .build();
        let breaker = CircuitBreaker::new("test", config);
        fail(&breaker).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        let probing = breaker.clone();
        let stale = tokio::spawn(async move {
            probing
                .call(std::future::pending::<Result<i32, String>>)
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // The second probe fails and reopens the circuit under the first.
        fail(&breaker).await;
        assert_eq!(breaker.state().await, State::Open);
        tokio::time::sleep(Duration::from_millis(40)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let probing = breaker.clone();
        let fresh = tokio::spawn(async move {
            probing
                .call(|| async move {
                    let _ = release_rx.await;
                    Ok::<_, String>(2)
                })
                .await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(breaker.state().await, State::HalfOpen);

        stale.abort();
        let _ = stale.await;
        assert_eq!(breaker.state().await, State::HalfOpen);

        release_tx.send(()).unwrap();
        assert_eq!(fresh.await.unwrap(), Ok(2));
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[tokio::test]
    async fn test_reset_closes_circuit() {
        let breaker = breaker(1, Duration::from_secs(60));
        fail(&breaker).await;
        breaker.reset().await;
        assert_eq!(breaker.state().await, State::Closed);
    }

    #[test]
    fn test_config_clamps_success_threshold_to_probe_budget() {
        let config = CircuitBreakerConfig::builder()
            .success_threshold(5)
            .half_open_max_calls(2)
            .failure_threshold(0)
            .build();
        assert_eq!(config.success_threshold, 2);
        assert_eq!(config.failure_threshold, 1);
    }
}
