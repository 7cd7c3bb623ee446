//! Builders shared by the service integration tests.

#![allow(dead_code)]

use room_reservation_core::environment::Clock;
use room_reservation_core::{PaymentTransport, ReservationStore};
use room_reservation_runtime::circuit_breaker::CircuitBreakerConfig;
use room_reservation_runtime::retry::RetryPolicy;
use room_reservation_service::{AdmissionController, PaymentVerifier};
use room_reservation_testing::{InMemoryReservationStore, ScriptedTransport, test_clock};
use std::sync::Arc;
use std::time::Duration;

/// Verifier with the production policy shape but millisecond delays.
pub fn verifier(
    transport: Arc<dyn PaymentTransport>,
    max_attempts: usize,
    failure_threshold: usize,
    cooldown: Duration,
) -> PaymentVerifier {
    PaymentVerifier::new(
        transport,
        RetryPolicy::builder()
            .max_attempts(max_attempts)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .build(),
        CircuitBreakerConfig::builder()
            .failure_threshold(failure_threshold)
            .timeout(cooldown)
            .success_threshold(1)
            .half_open_max_calls(1)
            .build(),
        Duration::from_millis(200),
    )
}

/// Three attempts, a breaker that opens after five failures.
pub fn default_verifier(transport: Arc<dyn PaymentTransport>) -> Arc<PaymentVerifier> {
    Arc::new(verifier(transport, 3, 5, Duration::from_secs(30)))
}

/// Controller over `store` and `transport`, anchored on the test clock.
pub fn controller(
    store: Arc<dyn ReservationStore>,
    transport: Arc<ScriptedTransport>,
) -> AdmissionController {
    let clock: Arc<dyn Clock> = Arc::new(test_clock());
    AdmissionController::new(store, default_verifier(transport), clock)
}

/// Empty store plus a controller using it.
pub fn fresh(transport: Arc<ScriptedTransport>) -> (Arc<InMemoryReservationStore>, AdmissionController) {
    let store = Arc::new(InMemoryReservationStore::new());
    let controller = controller(store.clone(), transport);
    (store, controller)
}
