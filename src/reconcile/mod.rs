//! Phantom Frozen Reconciliation
//!
//! `users.frozen_balance` must equal the sum of the holds that are still
//! open. A hold is open while its `freeze` row in `balance_operations` has no
//! matching `charge` or `refund`; the audit trail, not the purchase state, is
//! authoritative, which keeps the comparison exact across state transitions.
//!
//! Drift is detected by pure functions ([`compute_drift`], [`stranded_holds`])
//! and corrected by [`Reconciler`] one user row at a time.

pub mod error;
pub mod pg;

pub use error::ReconcileError;
pub use pg::Reconciler;

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::ledger::RefundOutcome;
use crate::purchase::PurchaseState;

/// Stored balance columns of one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserFrozen {
    pub user_id: Uuid,
    pub balance: Decimal,
    pub frozen: Decimal,
}

/// A freeze with no charge or refund yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenHold {
    /// Purchase id the hold was placed for
    pub reference: String,
    pub user_id: Uuid,
    pub amount: Decimal,
    /// `None` when no purchase row exists for the reference
    pub state: Option<PurchaseState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Drift {
    pub user_id: Uuid,
    #[schema(value_type = String)]
    pub balance: Decimal,
    /// `users.frozen_balance` as stored
    #[schema(value_type = String)]
    pub recorded: Decimal,
    /// Sum of open holds
    #[schema(value_type = String)]
    pub expected: Decimal,
}

impl Drift {
    /// Positive when more is frozen than held
    pub fn phantom(&self) -> Decimal {
        self.recorded - self.expected
    }

    /// `rebase_frozen` would accept the expectation
    pub fn is_fixable(&self) -> bool {
        !self.expected.is_sign_negative() && self.expected <= self.balance
    }
}

/// How a stranded hold is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    Charge,
    Refund,
}

/// Open hold of a purchase that is already closed (or missing)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrandedHold {
    pub hold: OpenHold,
    pub settlement: Settlement,
}

impl StrandedHold {
    pub fn refund_outcome(&self) -> RefundOutcome {
        match self.hold.state {
            Some(PurchaseState::Failed) => RefundOutcome::Failed,
            _ => RefundOutcome::Refunded,
        }
    }
}

/// Summary of one reconciliation run
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub drifted: usize,
    pub fixed: usize,
    /// Drifted users whose expectation exceeds their balance
    pub skipped: usize,
    /// Sum of positive drift (frozen with nothing behind it)
    #[schema(value_type = String)]
    pub phantom_total: Decimal,
    pub stranded: usize,
    pub stranded_settled: usize,
    pub drifts: Vec<Drift>,
}

/// Users whose stored frozen differs from the sum of their open holds
///
/// Holds of users missing from `users` are ignored.
pub fn compute_drift(users: &[UserFrozen], holds: &[OpenHold]) -> Vec<Drift> {
    let mut expected: HashMap<Uuid, Decimal> = HashMap::new();
    for hold in holds {
        *expected.entry(hold.user_id).or_insert(Decimal::ZERO) += hold.amount;
    }

    users
        .iter()
        .filter_map(|user| {
            let held = expected.get(&user.user_id).copied().unwrap_or(Decimal::ZERO);
            (held != user.frozen).then(|| Drift {
                user_id: user.user_id,
                balance: user.balance,
                recorded: user.frozen,
                expected: held,
            })
        })
        .collect()
}

/// Open holds whose purchase can no longer settle them itself
pub fn stranded_holds(holds: &[OpenHold]) -> Vec<StrandedHold> {
    holds
        .iter()
        .filter(|h| h.state.is_none_or(|s| s.is_terminal()))
        .map(|h| StrandedHold {
            hold: h.clone(),
            settlement: match h.state {
                Some(PurchaseState::Received) => Settlement::Charge,
                _ => Settlement::Refund,
            },
        })
        .collect()
}

/// Report for a set of drifts; nothing fixed yet
pub fn summarize(scanned: usize, drifts: Vec<Drift>, stranded: usize) -> ReconcileReport {
    ReconcileReport {
        scanned,
        drifted: drifts.len(),
        phantom_total: drifts
            .iter()
            .map(Drift::phantom)
            .filter(|p| p.is_sign_positive())
            .sum(),
        stranded,
        drifts,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: Uuid, balance: i64, frozen: i64) -> UserFrozen {
        UserFrozen {
            user_id: id,
            balance: Decimal::from(balance),
            frozen: Decimal::from(frozen),
        }
    }

    fn hold(id: Uuid, reference: &str, amount: i64, state: Option<PurchaseState>) -> OpenHold {
        OpenHold {
            reference: reference.to_string(),
            user_id: id,
            amount: Decimal::from(amount),
            state,
        }
    }

    #[test]
    fn test_consistent_users_have_no_drift() {
        let a = Uuid::new_v4();
        let holds = vec![
            hold(a, "p1", 2, Some(PurchaseState::Active)),
            hold(a, "p2", 3, Some(PurchaseState::Ordering)),
        ];
        assert!(compute_drift(&[user(a, 10, 5)], &holds).is_empty());
    }

    #[test]
    fn test_phantom_frozen_detected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let holds = vec![hold(a, "p1", 2, Some(PurchaseState::Active))];
        let drifts = compute_drift(&[user(a, 10, 5), user(b, 10, 4)], &holds);

        assert_eq!(drifts.len(), 2);
        assert_eq!(drifts[0].expected, Decimal::from(2));
        assert_eq!(drifts[0].phantom(), Decimal::from(3));
        assert_eq!(drifts[1].expected, Decimal::ZERO);

        let report = summarize(2, drifts, 0);
        assert_eq!(report.drifted, 2);
        assert_eq!(report.phantom_total, Decimal::from(7));
    }

    #[test]
    fn test_under_frozen_detected() {
        let a = Uuid::new_v4();
        let holds = vec![hold(a, "p1", 4, Some(PurchaseState::Active))];
        let drifts = compute_drift(&[user(a, 10, 1)], &holds);
        assert_eq!(drifts[0].phantom(), Decimal::from(-3));
        assert!(drifts[0].is_fixable());
        assert_eq!(summarize(1, drifts, 0).phantom_total, Decimal::ZERO);
    }

    #[test]
    fn test_expectation_above_balance_not_fixable() {
        let a = Uuid::new_v4();
        let holds = vec![hold(a, "p1", 12, Some(PurchaseState::Active))];
        let drifts = compute_drift(&[user(a, 10, 0)], &holds);
        assert!(!drifts[0].is_fixable());
    }

    #[test]
    fn test_stranded_holds() {
        let a = Uuid::new_v4();
        let holds = vec![
            hold(a, "live", 1, Some(PurchaseState::Active)),
            hold(a, "refunding", 1, Some(PurchaseState::Refunding)),
            hold(a, "got-sms", 1, Some(PurchaseState::Received)),
            hold(a, "cancelled", 1, Some(PurchaseState::Cancelled)),
            hold(a, "rejected", 1, Some(PurchaseState::Failed)),
            hold(a, "orphan", 1, None),
        ];
        let stranded = stranded_holds(&holds);
        let refs: Vec<_> = stranded.iter().map(|s| s.hold.reference.as_str()).collect();
        assert_eq!(refs, ["got-sms", "cancelled", "rejected", "orphan"]);

        assert_eq!(stranded[0].settlement, Settlement::Charge);
        assert_eq!(stranded[1].settlement, Settlement::Refund);
        assert_eq!(stranded[2].refund_outcome(), RefundOutcome::Failed);
        assert_eq!(stranded[3].refund_outcome(), RefundOutcome::Refunded);
    }
}
