//! Inbound payment-update events.
//!
//! The bank publishes one event per received transfer. The reservation is
//! identified by the second whitespace-separated token of
//! `transactionDescription`, e.g. `"E2E-REF-001 AB12CD34"`.

use crate::reservation::ReservationId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A payment-update event as published by the bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdateEvent {
    /// Bank-side payment id
    #[serde(default)]
    pub payment_id: Option<String>,
    /// Payer account
    #[serde(default, alias = "debtorAccountnumber")]
    pub debtor_account_number: Option<String>,
    /// Amount received
    #[serde(default)]
    pub amount_received: Option<serde_json::Number>,
    /// `"<endToEndRef> <reservationId>"`
    #[serde(default)]
    pub transaction_description: Option<String>,
}

/// The event cannot be turned into a reservation reference.
///
/// These are not swallowed: the consumer redelivers and eventually dead-letters
/// the message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageFormatError {
    /// Payload is not a valid event document.
    #[error("Unparseable payment update: {0}")]
    Unparseable(String),

    /// `transactionDescription` is absent or blank.
    #[error("Payment update has no transaction description")]
    MissingDescription,

    /// `transactionDescription` has fewer than two tokens.
    #[error("Transaction description '{0}' does not carry a reservation id")]
    MalformedDescription(String),

    /// Second token is not an 8-character uppercase alphanumeric id.
    #[error("Invalid reservation id '{0}' in transaction description")]
    InvalidReservationId(String),
}

/// Stateless decode function handed to the confirmation handler.
pub type EventDecoder = fn(&[u8]) -> Result<PaymentUpdateEvent, MessageFormatError>;

/// Decode a JSON payload.
///
/// # Errors
///
/// Returns [`MessageFormatError::Unparseable`] for anything that is not a JSON
/// object with the expected field types.
pub fn decode_json(payload: &[u8]) -> Result<PaymentUpdateEvent, MessageFormatError> {
    serde_json::from_slice(payload).map_err(|e| MessageFormatError::Unparseable(e.to_string()))
}

impl PaymentUpdateEvent {
    /// Extract the reservation referenced by the transaction description.
    ///
    /// # Errors
    ///
    /// Returns a [`MessageFormatError`] if the description is missing, has fewer
    /// than two tokens, or the second token is not a valid reservation id.
    pub fn reservation_id(&self) -> Result<ReservationId, MessageFormatError> {
        let description = self
            .transaction_description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or(MessageFormatError::MissingDescription)?;

        let candidate = description
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| MessageFormatError::MalformedDescription(description.to_owned()))?;

        ReservationId::parse(candidate)
            .map_err(|_| MessageFormatError::InvalidReservationId(candidate.to_owned()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn event(description: Option<&str>) -> PaymentUpdateEvent {
        PaymentUpdateEvent {
            payment_id: Some("PAY-1".into()),
            debtor_account_number: Some("NL91ABNA0417164300".into()),
            amount_received: Some(serde_json::Number::from(250)),
            transaction_description: description.map(str::to_owned),
        }
    }

    #[test]
    fn decodes_camel_case_payload() {
        let payload = br#"{
            "paymentId": "PAY-9",
            "debtorAccountNumber": "DE89370400440532013000",
            "amountReceived": 199.99,
            "transactionDescription": "E2E-77 QW12ER34"
        }"#;
        let decoded = decode_json(payload).unwrap();
        assert_eq!(decoded.payment_id.as_deref(), Some("PAY-9"));
        assert_eq!(decoded.reservation_id().unwrap().as_str(), "QW12ER34");
    }

    #[test]
    fn accepts_lowercase_account_number_alias() {
        let payload = br#"{"debtorAccountnumber":"X1","transactionDescription":"A B1234567"}"#;
        let decoded = decode_json(payload).unwrap();
        assert_eq!(decoded.debtor_account_number.as_deref(), Some("X1"));
    }

    #[test]
    fn rejects_non_json() {
        assert!(matches!(
            decode_json(b"not json"),
            Err(MessageFormatError::Unparseable(_))
        ));
    }

    #[test]
    fn missing_or_blank_description() {
        assert_eq!(
            event(None).reservation_id(),
            Err(MessageFormatError::MissingDescription)
        );
        assert_eq!(
            event(Some("   ")).reservation_id(),
            Err(MessageFormatError::MissingDescription)
        );
    }

    #[test]
    fn single_token_description() {
        assert!(matches!(
            event(Some("E2E-REF-ONLY")).reservation_id(),
            Err(MessageFormatError::MalformedDescription(_))
        ));
    }

    #[test]
    fn second_token_must_be_a_reservation_id() {
        assert_eq!(
            event(Some("E2E-1 ab12cd34")).reservation_id(),
            Err(MessageFormatError::InvalidReservationId("ab12cd34".into()))
        );
        assert!(event(Some("E2E-1 AB12CD3")).reservation_id().is_err());
    }

    #[test]
    fn extra_tokens_are_ignored() {
        let id = event(Some("  E2E-1   AB12CD34 thanks ")).reservation_id().unwrap();
        assert_eq!(id.as_str(), "AB12CD34");
    }
}
