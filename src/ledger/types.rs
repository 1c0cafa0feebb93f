//! Ledger Types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::balance::Balance;

/// What a `transactions` row records (`transactions.type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Activation,
    Rental,
    Deposit,
    AdminCredit,
    ReferralBonus,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Activation => "activation",
            TransactionKind::Rental => "rental",
            TransactionKind::Deposit => "deposit",
            TransactionKind::AdminCredit => "admin_credit",
            TransactionKind::ReferralBonus => "referral_bonus",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "activation" => Some(TransactionKind::Activation),
            "rental" => Some(TransactionKind::Rental),
            "deposit" => Some(TransactionKind::Deposit),
            "admin_credit" => Some(TransactionKind::AdminCredit),
            "referral_bonus" => Some(TransactionKind::ReferralBonus),
            _ => None,
        }
    }

    /// Purchases hold funds; everything else credits them
    pub fn is_purchase(&self) -> bool {
        matches!(self, TransactionKind::Activation | TransactionKind::Rental)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `transactions.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "completed" => Some(TransactionStatus::Completed),
            "failed" => Some(TransactionStatus::Failed),
            "refunded" => Some(TransactionStatus::Refunded),
            _ => None,
        }
    }
}

/// `balance_operations.operation_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Freeze,
    Charge,
    Refund,
    Credit,
    Reconcile,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Freeze => "freeze",
            OperationType::Charge => "charge",
            OperationType::Refund => "refund",
            OperationType::Credit => "credit",
            OperationType::Reconcile => "reconcile",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "freeze" => Some(OperationType::Freeze),
            "charge" => Some(OperationType::Charge),
            "refund" => Some(OperationType::Refund),
            "credit" => Some(OperationType::Credit),
            "reconcile" => Some(OperationType::Reconcile),
            _ => None,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a refunded hold is reported in `transactions.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundOutcome {
    /// Provider rejected the order; the purchase never happened
    Failed,
    /// Timeout or cancellation after the number was issued
    Refunded,
}

impl RefundOutcome {
    pub fn status(&self) -> TransactionStatus {
        match self {
            RefundOutcome::Failed => TransactionStatus::Failed,
            RefundOutcome::Refunded => TransactionStatus::Refunded,
        }
    }
}

/// Funds to put on hold for one purchase
#[derive(Debug, Clone)]
pub struct Hold {
    pub purchase_id: String,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
}

/// Funds to add to a balance, keyed by `(source, reference)`
#[derive(Debug, Clone)]
pub struct Credit {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub source: TransactionKind,
    pub reference: String,
    pub description: String,
}

impl Credit {
    /// Key written to `balance_operations.reference`
    pub fn operation_reference(&self) -> String {
        format!("{}:{}", self.source.as_str(), self.reference)
    }
}

/// Balance as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BalanceView {
    #[schema(value_type = String, example = "12.5000")]
    pub balance: Decimal,
    #[schema(value_type = String, example = "1.2000")]
    pub frozen: Decimal,
    #[schema(value_type = String, example = "11.3000")]
    pub available: Decimal,
}

impl From<&Balance> for BalanceView {
    fn from(b: &Balance) -> Self {
        Self {
            balance: b.balance(),
            frozen: b.frozen(),
            available: b.available(),
        }
    }
}

/// Result of one ledger operation, with the audit snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerReceipt {
    pub user_id: Uuid,
    pub operation: OperationType,
    pub amount: Decimal,
    pub before: BalanceView,
    pub after: BalanceView,
    /// The operation had already been applied; nothing changed this time
    pub replayed: bool,
}

/// Row of `transactions`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub reference: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
