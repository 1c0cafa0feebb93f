//! Purchase Error Types

use rust_decimal::Decimal;
use thiserror::Error;

use super::validation::ValidationError;
use crate::ledger::LedgerError;
use crate::providers::ProviderError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PurchaseError {
    // === Validation Errors ===
    #[error("Purchase belongs to another user")]
    Forbidden,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Price {price} is below the minimum {min}")]
    PriceTooLow { price: Decimal, min: Decimal },

    #[error("Price {price} exceeds the limit {limit}")]
    PriceAboveLimit { price: Decimal, limit: Decimal },

    #[error("Provider not available: {0}")]
    UnsupportedProvider(String),

    // === Account Errors ===
    #[error("User not found")]
    UserNotFound,

    #[error("Insufficient balance")]
    InsufficientBalance,

    // === Provider Outcomes ===
    #[error("No numbers available for this service and country")]
    NoNumbers,

    #[error("Provider rejected the order: {0}")]
    ProviderRejected(String),

    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    // === State Errors ===
    #[error("Purchase not found: {0}")]
    NotFound(String),

    #[error("Purchase {id} is {state}; operation not allowed")]
    InvalidState { id: String, state: String },

    // === System Errors ===
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal system error: {0}")]
    SystemError(String),
}

impl PurchaseError {
    /// Error code for API responses and `purchases.error_code`
    pub fn code(&self) -> &'static str {
        match self {
            PurchaseError::Forbidden => "FORBIDDEN",
            PurchaseError::InvalidRequest(_) => "INVALID_REQUEST",
            PurchaseError::PriceTooLow { .. } => "PRICE_TOO_LOW",
            PurchaseError::PriceAboveLimit { .. } => "PRICE_ABOVE_LIMIT",
            PurchaseError::UnsupportedProvider(_) => "UNSUPPORTED_PROVIDER",
            PurchaseError::UserNotFound => "USER_NOT_FOUND",
            PurchaseError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            PurchaseError::NoNumbers => "NO_NUMBERS",
            PurchaseError::ProviderRejected(_) => "PROVIDER_REJECTED",
            PurchaseError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            PurchaseError::NotFound(_) => "PURCHASE_NOT_FOUND",
            PurchaseError::InvalidState { .. } => "INVALID_STATE",
            PurchaseError::Ledger(_) => "LEDGER_ERROR",
            PurchaseError::DatabaseError(_) => "DATABASE_ERROR",
            PurchaseError::SystemError(_) => "SYSTEM_ERROR",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            PurchaseError::Forbidden => 403,
            PurchaseError::InvalidRequest(_)
            | PurchaseError::PriceTooLow { .. }
            | PurchaseError::PriceAboveLimit { .. }
            | PurchaseError::UnsupportedProvider(_) => 400,
            PurchaseError::NotFound(_) => 404,
            PurchaseError::InvalidState { .. } => 409,
            PurchaseError::UserNotFound
            | PurchaseError::InsufficientBalance
            | PurchaseError::NoNumbers
            | PurchaseError::ProviderRejected(_) => 422,
            PurchaseError::ProviderUnavailable(_) => 503,
            PurchaseError::Ledger(_)
            | PurchaseError::DatabaseError(_)
            | PurchaseError::SystemError(_) => 500,
        }
    }

    /// Rebuild the error a FAILED purchase recorded
    pub fn from_failure(code: Option<&str>, message: Option<&str>) -> Self {
        let message = message.unwrap_or_default().to_string();
        match code {
            Some("INSUFFICIENT_BALANCE") => PurchaseError::InsufficientBalance,
            Some("USER_NOT_FOUND") => PurchaseError::UserNotFound,
            Some("NO_NUMBERS") => PurchaseError::NoNumbers,
            Some("PROVIDER_UNAVAILABLE") => PurchaseError::ProviderUnavailable(message),
            Some("UNSUPPORTED_PROVIDER") => PurchaseError::UnsupportedProvider(message),
            _ => PurchaseError::ProviderRejected(message),
        }
    }
}

impl From<LedgerError> for PurchaseError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientBalance { .. } => PurchaseError::InsufficientBalance,
            LedgerError::UserNotFound(_) => PurchaseError::UserNotFound,
            other => PurchaseError::Ledger(other.to_string()),
        }
    }
}

impl From<ProviderError> for PurchaseError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NoNumbers => PurchaseError::NoNumbers,
            ProviderError::NotConfigured(p) => PurchaseError::UnsupportedProvider(p),
            ProviderError::Rejected(msg) => PurchaseError::ProviderRejected(msg),
            other => PurchaseError::ProviderUnavailable(other.to_string()),
        }
    }
}

impl From<ValidationError> for PurchaseError {
    fn from(e: ValidationError) -> Self {
        PurchaseError::InvalidRequest(e.to_string())
    }
}

impl From<sqlx::Error> for PurchaseError {
    fn from(e: sqlx::Error) -> Self {
        PurchaseError::DatabaseError(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PurchaseError::NoNumbers.code(), "NO_NUMBERS");
        assert_eq!(
            PurchaseError::InsufficientBalance.code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(PurchaseError::Forbidden.http_status(), 403);
        assert_eq!(PurchaseError::NotFound("x".into()).http_status(), 404);
        assert_eq!(
            PurchaseError::ProviderUnavailable("down".into()).http_status(),
            503
        );
    }

    #[test]
    fn test_from_ledger_error() {
        let err: PurchaseError = LedgerError::InsufficientBalance {
            available: Decimal::ONE,
            required: Decimal::TWO,
        }
        .into();
        assert_eq!(err, PurchaseError::InsufficientBalance);

        let err: PurchaseError = LedgerError::Database("gone".into()).into();
        assert_eq!(err.http_status(), 500);
    }

    #[test]
    fn test_from_provider_error() {
        assert_eq!(
            PurchaseError::from(ProviderError::NoNumbers),
            PurchaseError::NoNumbers
        );
        assert_eq!(
            PurchaseError::from(ProviderError::BadKey).code(),
            "PROVIDER_UNAVAILABLE"
        );
    }

    #[test]
    fn test_from_failure_matches_codes() {
        for err in [
            PurchaseError::InsufficientBalance,
            PurchaseError::NoNumbers,
            PurchaseError::ProviderUnavailable("down".into()),
            PurchaseError::ProviderRejected("bad country".into()),
        ] {
            let rebuilt = PurchaseError::from_failure(Some(err.code()), Some(&message(&err)));
            assert_eq!(rebuilt.code(), err.code());
        }
    }

    fn message(err: &PurchaseError) -> String {
        match err {
            PurchaseError::ProviderUnavailable(m) | PurchaseError::ProviderRejected(m) => {
                m.clone()
            }
            _ => String::new(),
        }
    }
}
