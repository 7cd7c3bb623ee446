//! Payment authority double.

use room_reservation_core::{PaymentStatus, PaymentTransport, TransportError};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

type Answer = Result<PaymentStatus, TransportError>;

/// Transport that replays scripted answers, then repeats a fallback.
///
/// Every call is counted and its reference recorded, so tests can assert how
/// many times the authority was reached.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Answer>>,
    fallback: Answer,
    latency: Duration,
    calls: AtomicUsize,
    references: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    /// Answer every call with `fallback`.
    #[must_use]
    pub fn always(fallback: Answer) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            references: Mutex::new(Vec::new()),
        }
    }

    /// Approve every payment.
    #[must_use]
    pub fn confirming() -> Self {
        Self::always(Ok(PaymentStatus::Confirmed))
    }

    /// Reject every payment.
    #[must_use]
    pub fn rejecting() -> Self {
        Self::always(Ok(PaymentStatus::Rejected))
    }

    /// Fail every call with a 5xx.
    #[must_use]
    pub fn failing() -> Self {
        Self::always(Err(TransportError::Server { status: 503 }))
    }

    /// Answer the next unscripted call with `answer` before falling back.
    #[must_use]
    pub fn then(self, answer: Answer) -> Self {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(answer);
        self
    }

    /// Wait `latency` before answering each call.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of calls that reached the transport.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// References passed to the transport, in call order.
    #[must_use]
    pub fn references(&self) -> Vec<String> {
        self.references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_answer(&self) -> Answer {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

impl PaymentTransport for ScriptedTransport {
    fn check_status(
        &self,
        reference: String,
    ) -> Pin<Box<dyn Future<Output = Answer> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.references
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(reference);
        let answer = self.next_answer();
        let latency = self.latency;
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            answer
        })
    }
}
