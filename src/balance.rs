/// ENFORCED BALANCE TYPE - Used by the ledger
///
/// This is the SINGLE source of truth for balance arithmetic.
/// ALL balance mutations MUST go through these methods.
///
/// # Enforcement Strategy:
/// 1. Fields are PRIVATE - no direct access
/// 2. All mutations return Result - errors are explicit
/// 3. Version auto-increments - audit trail
/// 4. Validation happens before any field is touched
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Balance rule violations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("Amount must be positive, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("Insufficient available balance: available {available}, requested {requested}")]
    InsufficientAvailable {
        available: Decimal,
        requested: Decimal,
    },

    #[error("Insufficient frozen balance: frozen {frozen}, requested {requested}")]
    InsufficientFrozen { frozen: Decimal, requested: Decimal },

    #[error("Insufficient balance to charge: balance {balance}, requested {requested}")]
    InsufficientBalance { balance: Decimal, requested: Decimal },

    #[error("Frozen target {target} outside [0, {balance}]")]
    FrozenOutOfRange { target: Decimal, balance: Decimal },
}

/// Prepaid balance of one user
///
/// `balance` is the total the user owns and INCLUDES `frozen`; funds on hold
/// for in-flight purchases are `frozen`, the rest is `available()`.
///
/// # Invariants (ENFORCED by private fields):
/// - 0 <= frozen <= balance after every successful mutation
/// - version increments on every successful mutation
///
/// A value loaded from storage may violate the invariant (phantom frozen
/// funds written outside this type). Such a value still loads so that
/// `rebase_frozen` can repair it; `is_consistent` reports the violation.
///
/// # Usage:
/// ```ignore
/// let mut bal = Balance::default();
/// bal.credit(dec("10"))?;   // balance = 10
/// bal.freeze(dec("3"))?;    // frozen = 3, available = 7
/// bal.charge(dec("3"))?;    // balance = 7, frozen = 0
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Balance {
    balance: Decimal, // PRIVATE - ONLY modified through credit/debit/charge
    frozen: Decimal,  // PRIVATE - ONLY modified through freeze/release/charge/rebase_frozen
    version: u64,     // PRIVATE - Incremented on every mutation
}

impl Balance {
    /// Rebuild a balance from stored columns.
    pub fn from_parts(balance: Decimal, frozen: Decimal, version: u64) -> Self {
        Self {
            balance,
            frozen,
            version,
        }
    }

    // ============================================================
    // READ-ONLY GETTERS
    // ============================================================

    #[inline]
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    #[inline]
    pub fn frozen(&self) -> Decimal {
        self.frozen
    }

    /// Spendable funds: balance - frozen
    #[inline]
    pub fn available(&self) -> Decimal {
        self.balance - self.frozen
    }

    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// `0 <= frozen <= balance`
    pub fn is_consistent(&self) -> bool {
        !self.frozen.is_sign_negative() && self.frozen <= self.balance
    }

    // ============================================================
    // VALIDATED MUTATIONS
    // ============================================================

    /// Add funds (deposit, admin credit, referral bonus)
    pub fn credit(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        check_positive(amount)?;
        self.balance += amount;
        self.bump();
        Ok(())
    }

    /// Remove available funds
    pub fn debit(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        check_positive(amount)?;
        self.check_available(amount)?;
        self.balance -= amount;
        self.bump();
        Ok(())
    }

    /// Put available funds on hold for a purchase
    pub fn freeze(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        check_positive(amount)?;
        self.check_available(amount)?;
        self.frozen += amount;
        self.bump();
        Ok(())
    }

    /// Return held funds to available (refund)
    pub fn release(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        check_positive(amount)?;
        self.check_frozen(amount)?;
        self.frozen -= amount;
        self.bump();
        Ok(())
    }

    /// Turn held funds into spend: balance and frozen both drop
    pub fn charge(&mut self, amount: Decimal) -> Result<(), BalanceError> {
        check_positive(amount)?;
        self.check_frozen(amount)?;
        if self.balance < amount {
            return Err(BalanceError::InsufficientBalance {
                balance: self.balance,
                requested: amount,
            });
        }
        self.balance -= amount;
        self.frozen -= amount;
        self.bump();
        Ok(())
    }

    /// Overwrite frozen with the amount actually held by open purchases.
    ///
    /// Reconciliation only; `target` may be zero.
    pub fn rebase_frozen(&mut self, target: Decimal) -> Result<(), BalanceError> {
        if target.is_sign_negative() || target > self.balance {
            return Err(BalanceError::FrozenOutOfRange {
                target,
                balance: self.balance,
            });
        }
        self.frozen = target;
        self.bump();
        Ok(())
    }

    fn check_available(&self, amount: Decimal) -> Result<(), BalanceError> {
        if self.available() < amount {
            return Err(BalanceError::InsufficientAvailable {
                available: self.available(),
                requested: amount,
            });
        }
        Ok(())
    }

    fn check_frozen(&self, amount: Decimal) -> Result<(), BalanceError> {
        if self.frozen < amount {
            return Err(BalanceError::InsufficientFrozen {
                frozen: self.frozen,
                requested: amount,
            });
        }
        Ok(())
    }

    #[inline]
    fn bump(&mut self) {
        self.version = self.version.wrapping_add(1);
    }
}

fn check_positive(amount: Decimal) -> Result<(), BalanceError> {
    if amount <= Decimal::ZERO {
        return Err(BalanceError::NonPositiveAmount(amount));
    }
    Ok(())
}

// ============================================================
// TESTS - Prove enforcement works
// ============================================================
