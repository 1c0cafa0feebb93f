use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use sms_ledger::ledger::RefundOutcome;
use sms_ledger::purchase::PurchaseState;
use sms_ledger::reconcile::{
    OpenHold, Settlement, UserFrozen, compute_drift, stranded_holds, summarize,
};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn user(balance: &str, frozen: &str) -> UserFrozen {
    UserFrozen {
        user_id: Uuid::new_v4(),
        balance: dec(balance),
        frozen: dec(frozen),
    }
}

fn hold(user_id: Uuid, reference: &str, amount: &str, state: Option<PurchaseState>) -> OpenHold {
    OpenHold {
        reference: reference.to_string(),
        user_id,
        amount: dec(amount),
        state,
    }
}

#[test]
fn consistent_users_produce_no_drift() {
    let alice = user("10.00", "0.75");
    let holds = vec![
        hold(alice.user_id, "p1", "0.50", Some(PurchaseState::Active)),
        hold(alice.user_id, "p2", "0.25", Some(PurchaseState::Ordering)),
    ];
    assert!(compute_drift(&[alice], &holds).is_empty());
}

#[test]
fn phantom_frozen_is_reported() {
    // Crashed between refund and frozen update: 2.00 frozen, nothing held
    let bob = user("5.00", "2.00");
    let carol = user("3.00", "0.40");
    let holds = vec![hold(carol.user_id, "p9", "0.40", Some(PurchaseState::Active))];

    let drifts = compute_drift(&[bob.clone(), carol], &holds);
    assert_eq!(drifts.len(), 1);
    assert_eq!(drifts[0].user_id, bob.user_id);
    assert_eq!(drifts[0].expected, Decimal::ZERO);
    assert_eq!(drifts[0].phantom(), dec("2.00"));
    assert!(drifts[0].is_fixable());

    let report = summarize(2, drifts, 0);
    assert_eq!(report.scanned, 2);
    assert_eq!(report.drifted, 1);
    assert_eq!(report.phantom_total, dec("2.00"));
    assert_eq!(report.fixed, 0);
}

#[test]
fn under_frozen_is_drift_without_phantom() {
    let dave = user("4.00", "0.10");
    let holds = vec![hold(dave.user_id, "p3", "0.30", Some(PurchaseState::Active))];

    let drifts = compute_drift(&[dave], &holds);
    assert_eq!(drifts[0].phantom(), dec("-0.20"));
    assert_eq!(summarize(1, drifts, 0).phantom_total, Decimal::ZERO);
}

#[test]
fn expectation_above_balance_is_not_fixable() {
    let erin = user("0.20", "0.00");
    let holds = vec![hold(erin.user_id, "p4", "0.50", Some(PurchaseState::Frozen))];
    let drifts = compute_drift(&[erin], &holds);
    assert!(!drifts[0].is_fixable());
}

#[test]
fn stranded_holds_follow_the_purchase_outcome() {
    let id = Uuid::new_v4();
    let holds = vec![
        hold(id, "active", "0.10", Some(PurchaseState::Active)),
        hold(id, "refunding", "0.10", Some(PurchaseState::Refunding)),
        hold(id, "received", "0.20", Some(PurchaseState::Received)),
        hold(id, "failed", "0.30", Some(PurchaseState::Failed)),
        hold(id, "timeout", "0.40", Some(PurchaseState::Timeout)),
        hold(id, "orphan", "0.50", None),
    ];

    let stranded = stranded_holds(&holds);
    let refs: Vec<_> = stranded.iter().map(|s| s.hold.reference.as_str()).collect();
    assert_eq!(refs, ["received", "failed", "timeout", "orphan"]);

    assert_eq!(stranded[0].settlement, Settlement::Charge);
    assert_eq!(stranded[1].settlement, Settlement::Refund);
    assert_eq!(stranded[1].refund_outcome(), RefundOutcome::Failed);
    assert_eq!(stranded[2].refund_outcome(), RefundOutcome::Refunded);
    assert_eq!(stranded[3].settlement, Settlement::Refund);
}
