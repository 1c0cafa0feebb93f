//! Reconciler over the live tables

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::ReconcileError;
use super::{
    Drift, OpenHold, ReconcileReport, Settlement, StrandedHold, UserFrozen, compute_drift,
    stranded_holds, summarize,
};
use crate::ledger::pg::{insert_operation, lock_balance, store_balance};
use crate::ledger::{Ledger, LedgerError, OperationType, PgLedger};
use crate::purchase::PurchaseState;

const OPEN_HOLDS_SQL: &str = r#"
    SELECT f.reference, f.user_id, f.amount, p.state
    FROM balance_operations f
    LEFT JOIN purchases p ON p.id = f.reference
    WHERE f.operation_type = 'freeze'
      AND NOT EXISTS (
          SELECT 1 FROM balance_operations s
          WHERE s.reference = f.reference
            AND s.operation_type IN ('charge', 'refund')
      )
"#;

/// What happened to one drifted user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixResult {
    Fixed,
    /// Expectation exceeds balance; needs a human
    Skipped,
    /// Consistent by the time the row was locked
    Settled,
}

pub struct Reconciler {
    pool: PgPool,
    ledger: PgLedger,
}

impl Reconciler {
    pub fn new(pool: PgPool) -> Self {
        Self {
            ledger: PgLedger::new(pool.clone()),
            pool,
        }
    }

    /// Dry run: drift and stranded holds as of now
    pub async fn scan(&self) -> Result<ReconcileReport, ReconcileError> {
        let holds = self.open_holds(None, &self.pool).await?;
        let users = self.candidate_users(&holds).await?;
        let drifts = compute_drift(&users, &holds);
        let stranded = stranded_holds(&holds);

        let report = summarize(users.len(), drifts, stranded.len());
        info!(
            scanned = report.scanned,
            drifted = report.drifted,
            phantom_total = %report.phantom_total,
            stranded = report.stranded,
            "Reconciliation scan"
        );
        Ok(report)
    }

    /// Settle stranded holds, then rebase every drifted user
    pub async fn run(&self) -> Result<ReconcileReport, ReconcileError> {
        let holds = self.open_holds(None, &self.pool).await?;
        let stranded = stranded_holds(&holds);
        let stranded_settled = self.settle_stranded(&stranded).await;

        let mut report = self.scan().await?;
        report.stranded = stranded.len();
        report.stranded_settled = stranded_settled;

        let drifts = report.drifts.clone();
        let (fixed, skipped) = self.apply(&drifts).await?;
        report.fixed = fixed;
        report.skipped = skipped;

        info!(
            fixed = report.fixed,
            skipped = report.skipped,
            stranded_settled = report.stranded_settled,
            "Reconciliation applied"
        );
        Ok(report)
    }

    /// Rebase the frozen balance of each drifted user; returns `(fixed, skipped)`
    ///
    /// The expectation is recomputed under the row lock, so drift that
    /// resolved itself since the scan is left alone.
    pub async fn apply(&self, drifts: &[Drift]) -> Result<(usize, usize), ReconcileError> {
        let mut fixed = 0;
        let mut skipped = 0;
        for drift in drifts {
            match self.fix_user(drift.user_id).await? {
                FixResult::Fixed => fixed += 1,
                FixResult::Skipped => skipped += 1,
                FixResult::Settled => {}
            }
        }
        Ok((fixed, skipped))
    }

    /// Close the holds of terminal or missing purchases; returns how many closed
    pub async fn settle_stranded(&self, stranded: &[StrandedHold]) -> usize {
        let mut settled = 0;
        for s in stranded {
            let reference = &s.hold.reference;
            let result = match s.settlement {
                Settlement::Charge => self.ledger.charge(reference).await,
                Settlement::Refund => self.ledger.refund(reference, s.refund_outcome()).await,
            };
            match result {
                Ok(_) | Err(LedgerError::AlreadySettled { .. }) => {
                    info!(
                        reference = %reference,
                        user_id = %s.hold.user_id,
                        settlement = ?s.settlement,
                        "Stranded hold settled"
                    );
                    settled += 1;
                }
                Err(e) => {
                    warn!(reference = %reference, error = %e, "Stranded hold not settled");
                }
            }
        }
        settled
    }

    async fn fix_user(&self, user_id: Uuid) -> Result<FixResult, ReconcileError> {
        let mut tx = self.pool.begin().await?;
        let mut balance = lock_balance(&mut tx, user_id).await?;

        let expected: Decimal = self
            .open_holds(Some(user_id), &mut *tx)
            .await?
            .iter()
            .map(|h| h.amount)
            .sum();

        if expected == balance.frozen() {
            tx.rollback().await?;
            return Ok(FixResult::Settled);
        }

        let before = balance;
        if let Err(e) = balance.rebase_frozen(expected) {
            tx.rollback().await?;
            error!(
                user_id = %user_id,
                balance = %before.balance(),
                frozen = %before.frozen(),
                expected = %expected,
                error = %e,
                "Open holds exceed balance; left for manual review"
            );
            return Ok(FixResult::Skipped);
        }

        store_balance(&mut tx, user_id, &balance).await?;
        let reason = format!("frozen {} -> {}", before.frozen(), expected);
        insert_operation(
            &mut tx,
            user_id,
            OperationType::Reconcile,
            &format!("reconcile:{}", ulid::Ulid::new()),
            (before.frozen() - expected).abs(),
            &before,
            &balance,
            Some(&reason),
        )
        .await?;
        tx.commit().await?;

        warn!(
            user_id = %user_id,
            frozen_before = %before.frozen(),
            frozen_after = %expected,
            "Phantom frozen corrected"
        );
        Ok(FixResult::Fixed)
    }

    async fn open_holds<'e, E>(
        &self,
        user_id: Option<Uuid>,
        executor: E,
    ) -> Result<Vec<OpenHold>, ReconcileError>
    where
        E: sqlx::PgExecutor<'e>,
    {
        let rows = match user_id {
            Some(id) => {
                let sql = format!("{OPEN_HOLDS_SQL} AND f.user_id = $1");
                sqlx::query(&sql).bind(id).fetch_all(executor).await?
            }
            None => sqlx::query(OPEN_HOLDS_SQL).fetch_all(executor).await?,
        };

        rows.iter().map(row_to_hold).collect()
    }

    /// Users with frozen funds or an open hold
    async fn candidate_users(&self, holds: &[OpenHold]) -> Result<Vec<UserFrozen>, ReconcileError> {
        let ids: Vec<Uuid> = holds.iter().map(|h| h.user_id).collect();
        let rows = sqlx::query(
            r#"
            SELECT id, balance, frozen_balance
            FROM users
            WHERE frozen_balance <> 0 OR id = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }
}

fn row_to_hold(row: &sqlx::postgres::PgRow) -> Result<OpenHold, ReconcileError> {
    let state: Option<i16> = row.try_get("state")?;
    let state = match state {
        Some(id) => Some(
            PurchaseState::from_id(id)
                .ok_or_else(|| ReconcileError::CorruptRow(format!("unknown purchase state {id}")))?,
        ),
        None => None,
    };
    Ok(OpenHold {
        reference: row.try_get("reference")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        state,
    })
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> Result<UserFrozen, ReconcileError> {
    Ok(UserFrozen {
        user_id: row.try_get("id")?,
        balance: row.try_get("balance")?,
        frozen: row.try_get("frozen_balance")?,
    })
}
