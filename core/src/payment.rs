//! Contract with the external payment authority.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Authority's verdict on a card payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Payment went through
    Confirmed,
    /// Payment was refused
    Rejected,
}

/// Body sent to the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusRequest {
    /// Card payment reference supplied by the guest
    pub reference: String,
}

/// Body returned by the authority. Unknown fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    /// Verdict
    pub status: PaymentStatus,
}

/// Failure of a single call to the authority.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// 4xx: the authority understood the request and refused it.
    #[error("Payment authority refused the request with status {status}")]
    Client {
        /// HTTP status code
        status: u16,
    },

    /// 5xx: the authority failed.
    #[error("Payment authority failed with status {status}")]
    Server {
        /// HTTP status code
        status: u16,
    },

    /// No answer within the configured timeout.
    #[error("Payment authority call timed out")]
    Timeout,

    /// Connection could not be established or was dropped.
    #[error("Payment authority unreachable: {0}")]
    Connection(String),

    /// A 2xx answer that could not be read.
    #[error("Unreadable payment authority response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Server { .. } | Self::Timeout | Self::Connection(_))
    }

    /// Whether the authority answered with a 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Client { .. })
    }
}

/// One call to the payment authority, without any resilience policy.
pub trait PaymentTransport: Send + Sync {
    /// Ask the authority for the status of the payment behind `reference`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] describing why no verdict was obtained.
    fn check_status(
        &self,
        reference: String,
    ) -> Pin<Box<dyn Future<Output = Result<PaymentStatus, TransportError>> + Send + '_>>;
}
