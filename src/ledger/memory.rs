//! In-memory ledger for tests
//!
//! Same idempotency and settlement rules as `PgLedger`, one mutex instead of
//! row locks.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

use super::error::LedgerError;
use super::types::{
    BalanceView, Credit, Hold, LedgerReceipt, OperationType, RefundOutcome, TransactionKind,
    TransactionStatus,
};
use super::Ledger;
use crate::balance::Balance;

#[derive(Debug, Clone)]
pub struct MemoryTransaction {
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub amount: Decimal,
    pub reference: String,
}

#[derive(Default)]
struct State {
    balances: HashMap<Uuid, Balance>,
    operations: HashMap<(String, OperationType), LedgerReceipt>,
    transactions: Vec<MemoryTransaction>,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
    fail_next: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with a starting balance
    pub fn with_user(self, user_id: Uuid, balance: Decimal) -> Self {
        self.set_balance(user_id, balance, Decimal::ZERO);
        self
    }

    /// Overwrite stored columns, bypassing the rules (simulates drift)
    pub fn set_balance(&self, user_id: Uuid, balance: Decimal, frozen: Decimal) {
        let mut state = self.state.lock().unwrap();
        state
            .balances
            .insert(user_id, Balance::from_parts(balance, frozen, 0));
    }

    pub fn balance_of(&self, user_id: Uuid) -> Balance {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(&user_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn transactions(&self) -> Vec<MemoryTransaction> {
        self.state.lock().unwrap().transactions.clone()
    }

    pub fn has_operation(&self, reference: &str, op: OperationType) -> bool {
        self.state
            .lock()
            .unwrap()
            .operations
            .contains_key(&(reference.to_string(), op))
    }

    /// Next call fails with a transient database error
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    fn check_fault(&self) -> Result<(), LedgerError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::Database("injected fault".into()));
        }
        Ok(())
    }

    fn settle(
        &self,
        purchase_id: &str,
        op: OperationType,
        status: TransactionStatus,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.check_fault()?;
        let mut state = self.state.lock().unwrap();

        let hold = state
            .operations
            .get(&(purchase_id.to_string(), OperationType::Freeze))
            .cloned()
            .ok_or_else(|| LedgerError::HoldNotFound(purchase_id.to_string()))?;

        if let Some(done) = state.operations.get(&(purchase_id.to_string(), op)) {
            let mut replay = done.clone();
            replay.replayed = true;
            return Ok(replay);
        }

        let opposite = match op {
            OperationType::Charge => OperationType::Refund,
            _ => OperationType::Charge,
        };
        if state
            .operations
            .contains_key(&(purchase_id.to_string(), opposite))
        {
            return Err(LedgerError::AlreadySettled {
                purchase_id: purchase_id.to_string(),
                settled_by: opposite.as_str(),
            });
        }

        let mut balance = state
            .balances
            .get(&hold.user_id)
            .copied()
            .ok_or(LedgerError::UserNotFound(hold.user_id))?;
        let before = balance;
        match op {
            OperationType::Charge => balance.charge(hold.amount)?,
            _ => balance.release(hold.amount)?,
        }

        state.balances.insert(hold.user_id, balance);
        for tx in state
            .transactions
            .iter_mut()
            .filter(|t| t.reference == purchase_id && t.kind.is_purchase())
        {
            tx.status = status;
        }

        let receipt = LedgerReceipt {
            user_id: hold.user_id,
            operation: op,
            amount: hold.amount,
            before: BalanceView::from(&before),
            after: BalanceView::from(&balance),
            replayed: false,
        };
        state
            .operations
            .insert((purchase_id.to_string(), op), receipt.clone());
        Ok(receipt)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn freeze(&self, hold: &Hold) -> Result<LedgerReceipt, LedgerError> {
        self.check_fault()?;
        let mut state = self.state.lock().unwrap();
        let key = (hold.purchase_id.clone(), OperationType::Freeze);

        if let Some(done) = state.operations.get(&key) {
            let mut replay = done.clone();
            replay.replayed = true;
            return Ok(replay);
        }

        let mut balance = state
            .balances
            .get(&hold.user_id)
            .copied()
            .ok_or(LedgerError::UserNotFound(hold.user_id))?;
        let before = balance;
        balance.freeze(hold.amount)?;

        state.balances.insert(hold.user_id, balance);
        state.transactions.push(MemoryTransaction {
            user_id: hold.user_id,
            kind: hold.kind,
            status: TransactionStatus::Pending,
            amount: hold.amount,
            reference: hold.purchase_id.clone(),
        });

        let receipt = LedgerReceipt {
            user_id: hold.user_id,
            operation: OperationType::Freeze,
            amount: hold.amount,
            before: BalanceView::from(&before),
            after: BalanceView::from(&balance),
            replayed: false,
        };
        state.operations.insert(key, receipt.clone());
        Ok(receipt)
    }

    async fn charge(&self, purchase_id: &str) -> Result<LedgerReceipt, LedgerError> {
        self.settle(
            purchase_id,
            OperationType::Charge,
            TransactionStatus::Completed,
        )
    }

    async fn refund(
        &self,
        purchase_id: &str,
        outcome: RefundOutcome,
    ) -> Result<LedgerReceipt, LedgerError> {
        self.settle(purchase_id, OperationType::Refund, outcome.status())
    }

    async fn credit(&self, credit: &Credit) -> Result<LedgerReceipt, LedgerError> {
        self.check_fault()?;
        let mut state = self.state.lock().unwrap();
        let key = (credit.operation_reference(), OperationType::Credit);

        if let Some(done) = state.operations.get(&key) {
            if done.user_id != credit.user_id || done.amount != credit.amount {
                return Err(LedgerError::ReferenceConflict {
                    reference: key.0,
                    user_id: done.user_id,
                    amount: done.amount,
                });
            }
            let mut replay = done.clone();
            replay.replayed = true;
            return Ok(replay);
        }

        let mut balance = state
            .balances
            .get(&credit.user_id)
            .copied()
            .ok_or(LedgerError::UserNotFound(credit.user_id))?;
        let before = balance;
        balance.credit(credit.amount)?;

        state.balances.insert(credit.user_id, balance);
        state.transactions.push(MemoryTransaction {
            user_id: credit.user_id,
            kind: credit.source,
            status: TransactionStatus::Completed,
            amount: credit.amount,
            reference: credit.reference.clone(),
        });

        let receipt = LedgerReceipt {
            user_id: credit.user_id,
            operation: OperationType::Credit,
            amount: credit.amount,
            before: BalanceView::from(&before),
            after: BalanceView::from(&balance),
            replayed: false,
        };
        state.operations.insert(key, receipt.clone());
        Ok(receipt)
    }

    async fn snapshot(&self, user_id: Uuid) -> Result<BalanceView, LedgerError> {
        self.check_fault()?;
        let state = self.state.lock().unwrap();
        state
            .balances
            .get(&user_id)
            .map(BalanceView::from)
            .ok_or(LedgerError::UserNotFound(user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hold(user_id: Uuid, purchase_id: &str, amount: Decimal) -> Hold {
        Hold {
            purchase_id: purchase_id.to_string(),
            user_id,
            amount,
            kind: TransactionKind::Activation,
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_freeze_then_refund() {
        let user = Uuid::new_v4();
        let ledger = MemoryLedger::new().with_user(user, Decimal::TEN);

        ledger.freeze(&hold(user, "p1", Decimal::TWO)).await.unwrap();
        assert_eq!(ledger.balance_of(user).available(), Decimal::from(8));

        let receipt = ledger.refund("p1", RefundOutcome::Refunded).await.unwrap();
        assert!(!receipt.replayed);
        assert_eq!(receipt.after.available, Decimal::TEN);
        assert_eq!(
            ledger.transactions()[0].status,
            TransactionStatus::Refunded
        );

        assert!(
            ledger
                .refund("p1", RefundOutcome::Refunded)
                .await
                .unwrap()
                .replayed
        );
        assert!(matches!(
            ledger.charge("p1").await,
            Err(LedgerError::AlreadySettled { .. })
        ));
    }

    fn deposit(user_id: Uuid, amount: Decimal, reference: &str) -> Credit {
        Credit {
            user_id,
            amount,
            source: TransactionKind::AdminCredit,
            reference: reference.to_string(),
            description: String::new(),
        }
    }

    #[tokio::test]
    async fn test_credit_reference_bound_to_user_and_amount() {
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let ledger = MemoryLedger::new()
            .with_user(alice, Decimal::ZERO)
            .with_user(bob, Decimal::ZERO);

        ledger.credit(&deposit(alice, Decimal::TEN, "r1")).await.unwrap();
        assert!(
            ledger
                .credit(&deposit(alice, Decimal::TEN, "r1"))
                .await
                .unwrap()
                .replayed
        );

        let err = ledger
            .credit(&deposit(bob, Decimal::TEN, "r1"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::ReferenceConflict {
                reference: "admin_credit:r1".to_string(),
                user_id: alice,
                amount: Decimal::TEN,
            }
        );
        assert!(matches!(
            ledger.credit(&deposit(alice, Decimal::ONE, "r1")).await,
            Err(LedgerError::ReferenceConflict { .. })
        ));

        assert_eq!(ledger.balance_of(alice).balance(), Decimal::TEN);
        assert_eq!(ledger.balance_of(bob).balance(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_settle_without_hold() {
        let ledger = MemoryLedger::new();
        assert!(matches!(
            ledger.charge("missing").await,
            Err(LedgerError::HoldNotFound(_))
        ));
    }
}
