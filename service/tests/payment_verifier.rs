//! Retry, circuit breaker and timeout around the payment authority.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::verifier;
use room_reservation_core::{PaymentStatus, TransportError};
use room_reservation_runtime::circuit_breaker::State;
use room_reservation_service::VerificationError;
use room_reservation_testing::ScriptedTransport;
use std::sync::Arc;
use std::time::{Duration, Instant};

const LONG_COOLDOWN: Duration = Duration::from_secs(60);

#[tokio::test]
async fn test_first_answer_is_returned() {
    let transport = Arc::new(ScriptedTransport::rejecting());
    let verifier = verifier(transport.clone(), 3, 5, LONG_COOLDOWN);

    assert_eq!(verifier.verify("REF-1").await, Ok(PaymentStatus::Rejected));
    assert_eq!(transport.calls(), 1);
    assert_eq!(transport.references(), vec!["REF-1"]);
}

#[tokio::test]
async fn test_server_errors_are_retried_until_the_budget_is_spent() {
    let transport = Arc::new(ScriptedTransport::failing());
    let verifier = verifier(transport.clone(), 3, 10, LONG_COOLDOWN);

    let result = verifier.verify("REF-1").await;

    assert!(matches!(result, Err(VerificationError::ServiceUnavailable(_))));
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_recovery_within_the_budget_succeeds() {
    let transport = Arc::new(
        ScriptedTransport::confirming()
            .then(Err(TransportError::Connection("reset".into())))
            .then(Err(TransportError::Server { status: 500 })),
    );
    let verifier = verifier(transport.clone(), 3, 10, LONG_COOLDOWN);

    assert_eq!(verifier.verify("REF-1").await, Ok(PaymentStatus::Confirmed));
    assert_eq!(transport.calls(), 3);
    assert_eq!(verifier.breaker_state().await, State::Closed);
}

#[tokio::test]
async fn test_client_errors_are_final_and_do_not_trip_the_breaker() {
    let transport = Arc::new(ScriptedTransport::always(Err(TransportError::Client { status: 400 })));
    let verifier = verifier(transport.clone(), 3, 2, LONG_COOLDOWN);

    for _ in 0..5 {
        assert_eq!(verifier.verify("BAD").await, Err(VerificationError::InvalidReference));
    }

    assert_eq!(transport.calls(), 5);
    assert_eq!(verifier.breaker_state().await, State::Closed);
}

#[tokio::test]
async fn test_unreadable_answer_is_not_retried() {
    let transport = Arc::new(ScriptedTransport::always(Err(TransportError::InvalidResponse(
        "expected value".into(),
    ))));
    let verifier = verifier(transport.clone(), 3, 10, LONG_COOLDOWN);

    assert!(matches!(
        verifier.verify("REF-1").await,
        Err(VerificationError::ServiceUnavailable(_))
    ));
    assert_eq!(transport.calls(), 1);
}

#[tokio::test]
async fn test_open_circuit_fails_fast_without_calling_the_authority() {
    let transport = Arc::new(ScriptedTransport::failing());
    let verifier = verifier(transport.clone(), 3, 5, LONG_COOLDOWN);

    // Three failures, then two more trip the breaker on the second call's
    // second attempt; its third attempt is rejected by the open circuit.
    verifier.verify("REF-1").await.unwrap_err();
    verifier.verify("REF-2").await.unwrap_err();
    assert_eq!(transport.calls(), 5);
    assert_eq!(verifier.breaker_state().await, State::Open);

    let started = Instant::now();
    let result = verifier.verify("REF-3").await;

    assert_eq!(
        result,
        Err(VerificationError::ServiceUnavailable("circuit breaker is open".into()))
    );
    assert_eq!(transport.calls(), 5);
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[tokio::test]
async fn test_successful_probe_closes_the_circuit() {
    let transport = Arc::new(ScriptedTransport::confirming().then(Err(TransportError::Server { status: 503 })));
    let verifier = verifier(transport.clone(), 1, 1, Duration::from_millis(50));

    verifier.verify("REF-1").await.unwrap_err();
    assert_eq!(verifier.breaker_state().await, State::Open);
    verifier.verify("REF-2").await.unwrap_err();
    assert_eq!(transport.calls(), 1);

    tokio::time::sleep(Duration::from_millis(80)).await;

    assert_eq!(verifier.verify("REF-3").await, Ok(PaymentStatus::Confirmed));
    assert_eq!(transport.calls(), 2);
    assert_eq!(verifier.breaker_state().await, State::Closed);
}

#[tokio::test]
async fn test_failed_probe_reopens_the_circuit() {
    let transport = Arc::new(ScriptedTransport::failing());
    let verifier = verifier(transport.clone(), 1, 1, Duration::from_millis(50));

    verifier.verify("REF-1").await.unwrap_err();
    tokio::time::sleep(Duration::from_millis(80)).await;
    verifier.verify("REF-2").await.unwrap_err();

    assert_eq!(transport.calls(), 2);
    assert_eq!(verifier.breaker_state().await, State::Open);
    verifier.verify("REF-3").await.unwrap_err();
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_slow_authority_times_out_each_attempt() {
    let transport = Arc::new(ScriptedTransport::confirming().with_latency(Duration::from_secs(2)));
    // Attempts are bounded at 200ms.
    let verifier = verifier(transport.clone(), 2, 10, LONG_COOLDOWN);

    let started = Instant::now();
    let result = verifier.verify("REF-1").await;

    assert_eq!(
        result,
        Err(VerificationError::ServiceUnavailable(TransportError::Timeout.to_string()))
    );
    assert_eq!(transport.calls(), 2);
    assert!(started.elapsed() < Duration::from_secs(1));
}
