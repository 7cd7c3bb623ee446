//! HTTP client for the payment authority.

use crate::config::PaymentServiceConfig;
use room_reservation_core::payment::{PaymentStatusRequest, PaymentStatusResponse};
use room_reservation_core::{PaymentStatus, PaymentTransport, TransportError};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Path of the status endpoint, relative to the base URL.
pub const PAYMENT_STATUS_PATH: &str = "/payment-status";

/// [`PaymentTransport`] that POSTs `{"reference": ...}` to
/// `{base_url}/payment-status`.
///
/// One call is one HTTP request; the client never retries on its own. The
/// connect timeout bounds connection setup and the request as a whole is
/// bounded by connect plus read timeout.
#[derive(Debug, Clone)]
pub struct HttpPaymentTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPaymentTransport {
    /// Build a transport for the authority at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Connection`] if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(connect_timeout + read_timeout)
            .build()
            .map_err(|e| TransportError::Connection(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{PAYMENT_STATUS_PATH}", base_url.trim_end_matches('/')),
        })
    }

    /// Build a transport from the payment service section of the configuration.
    ///
    /// # Errors
    ///
    /// Same as [`HttpPaymentTransport::new`].
    pub fn from_config(config: &PaymentServiceConfig) -> Result<Self, TransportError> {
        Self::new(&config.base_url, config.connect_timeout, config.read_timeout)
    }

    /// Full URL of the status endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn classify(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(error.to_string())
    }
}

impl PaymentTransport for HttpPaymentTransport {
    fn check_status(
        &self,
        reference: String,
    ) -> Pin<Box<dyn Future<Output = Result<PaymentStatus, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.endpoint)
                .json(&PaymentStatusRequest { reference })
                .send()
                .await
                .map_err(|e| classify(&e))?;

            let status = response.status();
            if status.is_client_error() {
                return Err(TransportError::Client {
                    status: status.as_u16(),
                });
            }
            if status.is_server_error() {
                return Err(TransportError::Server {
                    status: status.as_u16(),
                });
            }
            if !status.is_success() {
                return Err(TransportError::InvalidResponse(format!(
                    "unexpected status {status}"
                )));
            }

            let body: PaymentStatusResponse = response.json().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::InvalidResponse(e.to_string())
                }
            })?;

            tracing::debug!(status = ?body.status, "Payment authority answered");
            Ok(body.status)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_url_without_double_slash() {
        let transport =
            HttpPaymentTransport::new("http://cards:9000/", Duration::from_secs(1), Duration::from_secs(1))
                .unwrap();
        assert_eq!(transport.endpoint(), "http://cards:9000/payment-status");
    }
}
