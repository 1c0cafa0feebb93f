//! Ledger Error Types

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::balance::BalanceError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("User not found: {0}")]
    UserNotFound(Uuid),

    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        available: Decimal,
        required: Decimal,
    },

    #[error("No hold recorded for purchase {0}")]
    HoldNotFound(String),

    #[error("Hold for purchase {purchase_id} already settled by {settled_by}")]
    AlreadySettled {
        purchase_id: String,
        settled_by: &'static str,
    },

    /// Credit reference already used for another user or amount
    #[error("Reference {reference} already credited {amount} to user {user_id}")]
    ReferenceConflict {
        reference: String,
        user_id: Uuid,
        amount: Decimal,
    },

    #[error("Balance rule violated: {0}")]
    Balance(BalanceError),

    #[error("Database error: {0}")]
    Database(String),
}

impl LedgerError {
    /// Transient errors are worth retrying; everything else is a decision
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Database(_))
    }
}

impl From<BalanceError> for LedgerError {
    fn from(e: BalanceError) -> Self {
        match e {
            BalanceError::InsufficientAvailable {
                available,
                requested,
            } => LedgerError::InsufficientBalance {
                available,
                required: requested,
            },
            other => LedgerError::Balance(other),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_available_maps_to_insufficient_balance() {
        let err: LedgerError = BalanceError::InsufficientAvailable {
            available: Decimal::ONE,
            requested: Decimal::TWO,
        }
        .into();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                available: Decimal::ONE,
                required: Decimal::TWO
            }
        );
    }

    #[test]
    fn test_transient() {
        assert!(LedgerError::Database("timeout".into()).is_transient());
        assert!(!LedgerError::HoldNotFound("p1".into()).is_transient());
    }
}
