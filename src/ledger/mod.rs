//! Balance Ledger
//!
//! Freeze / charge / refund / credit against `users.balance` and
//! `users.frozen_balance`. Every operation is one database transaction that
//! locks the user's row, applies a [`Balance`](crate::balance::Balance)
//! mutation, writes the row back and appends a `balance_operations` audit row
//! with before/after snapshots.
//!
//! Operations are idempotent: a freeze, charge or refund is keyed by purchase
//! id, a credit by `(source, reference)`. Replays return the original receipt
//! with `replayed = true`.

pub mod error;
#[cfg(test)]
pub mod memory;
pub mod pg;
pub mod types;

use async_trait::async_trait;
use uuid::Uuid;

pub use error::LedgerError;
pub use pg::PgLedger;
pub use types::{
    BalanceView, Credit, Hold, LedgerReceipt, OperationType, RefundOutcome, TransactionKind,
    TransactionRecord, TransactionStatus,
};

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Put `hold.amount` on hold and open a pending transaction
    async fn freeze(&self, hold: &Hold) -> Result<LedgerReceipt, LedgerError>;

    /// Spend the held amount; the transaction completes
    async fn charge(&self, purchase_id: &str) -> Result<LedgerReceipt, LedgerError>;

    /// Release the held amount back to available
    async fn refund(
        &self,
        purchase_id: &str,
        outcome: RefundOutcome,
    ) -> Result<LedgerReceipt, LedgerError>;

    /// Add funds
    async fn credit(&self, credit: &Credit) -> Result<LedgerReceipt, LedgerError>;

    /// Current balance of one user
    async fn snapshot(&self, user_id: Uuid) -> Result<BalanceView, LedgerError>;
}
