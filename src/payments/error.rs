use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Payment gateway not configured: {0}")]
    NotConfigured(&'static str),

    #[error("Malformed notification: {0}")]
    InvalidPayload(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Webhook signature expired")]
    SignatureExpired,

    #[error("Payment could not be confirmed with the gateway: {0}")]
    Unconfirmed(String),

    #[error("Gateway unreachable: {0}")]
    Upstream(String),

    #[error("Unknown user: {0}")]
    UnknownUser(String),

    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl PaymentError {
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::NotConfigured(_) => "GATEWAY_NOT_CONFIGURED",
            PaymentError::InvalidPayload(_) => "INVALID_PAYLOAD",
            PaymentError::InvalidSignature => "INVALID_SIGNATURE",
            PaymentError::SignatureExpired => "SIGNATURE_EXPIRED",
            PaymentError::Unconfirmed(_) => "PAYMENT_UNCONFIRMED",
            PaymentError::Upstream(_) => "GATEWAY_UNREACHABLE",
            PaymentError::UnknownUser(_) => "USER_NOT_FOUND",
            PaymentError::Ledger(_) => "LEDGER_ERROR",
        }
    }

    /// Gateways retry on 5xx; a 4xx tells them to stop
    pub fn http_status(&self) -> u16 {
        match self {
            PaymentError::NotConfigured(_) => 404,
            PaymentError::InvalidPayload(_) | PaymentError::UnknownUser(_) => 400,
            PaymentError::InvalidSignature | PaymentError::SignatureExpired => 401,
            PaymentError::Unconfirmed(_) => 402,
            PaymentError::Upstream(_) => 502,
            PaymentError::Ledger(_) => 500,
        }
    }
}

impl From<LedgerError> for PaymentError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::UserNotFound(id) => PaymentError::UnknownUser(id.to_string()),
            // Redelivery cannot fix it; a 4xx stops the gateway retrying
            conflict @ LedgerError::ReferenceConflict { .. } => {
                PaymentError::InvalidPayload(conflict.to_string())
            }
            other => PaymentError::Ledger(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(e: serde_json::Error) -> Self {
        PaymentError::InvalidPayload(e.to_string())
    }
}
