use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl ReconcileError {
    pub fn code(&self) -> &'static str {
        match self {
            ReconcileError::Database(_) => "DATABASE_ERROR",
            ReconcileError::Ledger(_) => "LEDGER_ERROR",
            ReconcileError::CorruptRow(_) => "CORRUPT_ROW",
        }
    }
}
