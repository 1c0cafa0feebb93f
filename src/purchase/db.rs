//! Purchase Database Layer
//!
//! PostgreSQL persistence for the purchase FSM. Every state change is an
//! atomic CAS: `UPDATE ... WHERE id = $1 AND state = $expected`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use super::error::PurchaseError;
use super::state::{CloseReason, PurchaseState};
use super::types::{OrderDetails, PurchaseId, PurchaseKind, PurchaseRecord};

/// Storage seam of the coordinator
#[async_trait]
pub trait PurchaseStore: Send + Sync {
    /// Insert a PENDING record. When `(user_id, cid)` already exists the
    /// stored record is returned instead.
    async fn create(&self, record: &PurchaseRecord) -> Result<PurchaseRecord, PurchaseError>;

    async fn get(&self, id: PurchaseId) -> Result<Option<PurchaseRecord>, PurchaseError>;

    async fn get_by_cid(
        &self,
        user_id: Uuid,
        cid: &str,
    ) -> Result<Option<PurchaseRecord>, PurchaseError>;

    /// CAS state update; false when the state no longer matches
    async fn update_state_if(
        &self,
        id: PurchaseId,
        expected: PurchaseState,
        new: PurchaseState,
    ) -> Result<bool, PurchaseError>;

    /// CAS state update recording an error code and message
    async fn update_state_with_error(
        &self,
        id: PurchaseId,
        expected: PurchaseState,
        new: PurchaseState,
        code: &str,
        message: &str,
    ) -> Result<bool, PurchaseError>;

    /// CAS into REFUNDING with the reason (and error) that closes the purchase
    async fn begin_refund(
        &self,
        id: PurchaseId,
        expected: PurchaseState,
        reason: CloseReason,
        error: Option<(&str, &str)>,
    ) -> Result<bool, PurchaseError>;

    /// ORDERING → ACTIVE with the issued number
    async fn attach_order(
        &self,
        id: PurchaseId,
        order: &OrderDetails,
    ) -> Result<bool, PurchaseError>;

    /// Store the delivered SMS of an ACTIVE purchase
    async fn record_sms(
        &self,
        id: PurchaseId,
        code: Option<&str>,
        text: Option<&str>,
    ) -> Result<(), PurchaseError>;

    /// Count a step that made no progress. Leaves `updated_at` alone so the
    /// stale clock keeps running.
    async fn increment_retry(&self, id: PurchaseId) -> Result<(), PurchaseError>;

    /// Non-terminal, non-ACTIVE purchases untouched for `threshold`
    async fn find_stale(
        &self,
        threshold: Duration,
        limit: i64,
    ) -> Result<Vec<PurchaseRecord>, PurchaseError>;

    /// ACTIVE purchases, least recently polled first
    async fn find_active(&self, limit: i64) -> Result<Vec<PurchaseRecord>, PurchaseError>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        kind: Option<PurchaseKind>,
        limit: i64,
    ) -> Result<Vec<PurchaseRecord>, PurchaseError>;

    /// Σ price of fund-holding purchases per user
    async fn holding_totals(&self) -> Result<HashMap<Uuid, Decimal>, PurchaseError>;
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, cid, user_id, kind, provider, service, country, rent_hours, price,
           state, close_reason, provider_order_id, phone, provider_cost,
           sms_code, sms_text, error_code, error_message, retry_count,
           expires_at, created_at, updated_at
    FROM purchases
"#;

/// Fund-holding state ids, as bound into queries
fn holding_state_ids() -> Vec<i16> {
    [
        PurchaseState::Frozen,
        PurchaseState::Ordering,
        PurchaseState::Active,
        PurchaseState::Refunding,
    ]
    .iter()
    .map(PurchaseState::id)
    .collect()
}

/// Purchase database operations
#[derive(Clone)]
pub struct PurchaseDb {
    pool: PgPool,
}

impl PurchaseDb {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::postgres::PgRow) -> Result<PurchaseRecord, PurchaseError> {
        let id_str: String = row.get("id");
        let purchase_id: PurchaseId = id_str
            .parse()
            .map_err(|_| PurchaseError::SystemError(format!("Invalid purchase id: {id_str}")))?;

        let state_id: i16 = row.get("state");
        let state = PurchaseState::from_id(state_id)
            .ok_or_else(|| PurchaseError::SystemError(format!("Invalid state ID: {state_id}")))?;

        let kind_id: i16 = row.get("kind");
        let kind = PurchaseKind::from_id(kind_id)
            .ok_or_else(|| PurchaseError::SystemError(format!("Invalid kind: {kind_id}")))?;

        let provider_str: String = row.get("provider");
        let provider = provider_str
            .parse()
            .map_err(|_| PurchaseError::SystemError(format!("Invalid provider: {provider_str}")))?;

        let close_reason = row
            .get::<Option<i16>, _>("close_reason")
            .and_then(CloseReason::from_id);

        Ok(PurchaseRecord {
            purchase_id,
            cid: row.get("cid"),
            user_id: row.get("user_id"),
            kind,
            provider,
            service: row.get("service"),
            country: row.get("country"),
            rent_hours: row.get("rent_hours"),
            price: row.get("price"),
            state,
            close_reason,
            provider_order_id: row.get("provider_order_id"),
            phone: row.get("phone"),
            provider_cost: row.get("provider_cost"),
            sms_code: row.get("sms_code"),
            sms_text: row.get("sms_text"),
            error_code: row.get("error_code"),
            error_message: row.get("error_message"),
            retry_count: row.get("retry_count"),
            expires_at: row.get::<Option<DateTime<Utc>>, _>("expires_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }

    fn rows_to_records(rows: &[sqlx::postgres::PgRow]) -> Result<Vec<PurchaseRecord>, PurchaseError> {
        rows.iter().map(Self::row_to_record).collect()
    }
}

#[async_trait]
impl PurchaseStore for PurchaseDb {
    async fn create(&self, record: &PurchaseRecord) -> Result<PurchaseRecord, PurchaseError> {
        if let Some(cid) = &record.cid
            && let Some(existing) = self.get_by_cid(record.user_id, cid).await?
        {
            tracing::info!(
                purchase_id = %existing.purchase_id,
                cid = %cid,
                "Purchase with cid already exists - returning existing record"
            );
            return Ok(existing);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO purchases
                (id, cid, user_id, kind, provider, service, country, rent_hours, price,
                 state, retry_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 0, $11, $11)
            ON CONFLICT (user_id, cid) WHERE cid IS NOT NULL DO NOTHING
            "#,
        )
        .bind(record.purchase_id.to_string())
        .bind(&record.cid)
        .bind(record.user_id)
        .bind(record.kind.id())
        .bind(record.provider.as_str())
        .bind(&record.service)
        .bind(&record.country)
        .bind(record.rent_hours)
        .bind(record.price)
        .bind(record.state.id())
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            // Lost a race on the same cid
            if let Some(cid) = &record.cid
                && let Some(existing) = self.get_by_cid(record.user_id, cid).await?
            {
                return Ok(existing);
            }
            return Err(PurchaseError::SystemError(
                "purchase insert affected no rows".to_string(),
            ));
        }

        Ok(record.clone())
    }

    async fn get(&self, id: PurchaseId) -> Result<Option<PurchaseRecord>, PurchaseError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE id = $1"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn get_by_cid(
        &self,
        user_id: Uuid,
        cid: &str,
    ) -> Result<Option<PurchaseRecord>, PurchaseError> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE user_id = $1 AND cid = $2"))
            .bind(user_id)
            .bind(cid)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn update_state_if(
        &self,
        id: PurchaseId,
        expected: PurchaseState,
        new: PurchaseState,
    ) -> Result<bool, PurchaseError> {
        let result = sqlx::query(
            r#"
            UPDATE purchases
            SET state = $1, updated_at = NOW()
            WHERE id = $2 AND state = $3
            "#,
        )
        .bind(new.id())
        .bind(id.to_string())
        .bind(expected.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_state_with_error(
        &self,
        id: PurchaseId,
        expected: PurchaseState,
        new: PurchaseState,
        code: &str,
        message: &str,
    ) -> Result<bool, PurchaseError> {
        let result = sqlx::query(
            r#"
            UPDATE purchases
            SET state = $1, error_code = $2, error_message = $3, updated_at = NOW()
            WHERE id = $4 AND state = $5
            "#,
        )
        .bind(new.id())
        .bind(code)
        .bind(message)
        .bind(id.to_string())
        .bind(expected.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn begin_refund(
        &self,
        id: PurchaseId,
        expected: PurchaseState,
        reason: CloseReason,
        error: Option<(&str, &str)>,
    ) -> Result<bool, PurchaseError> {
        let (code, message) = error.unzip();
        let result = sqlx::query(
            r#"
            UPDATE purchases
            SET state = $1, close_reason = $2,
                error_code = COALESCE($3, error_code),
                error_message = COALESCE($4, error_message),
                updated_at = NOW()
            WHERE id = $5 AND state = $6
            "#,
        )
        .bind(PurchaseState::Refunding.id())
        .bind(reason.id())
        .bind(code)
        .bind(message)
        .bind(id.to_string())
        .bind(expected.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn attach_order(
        &self,
        id: PurchaseId,
        order: &OrderDetails,
    ) -> Result<bool, PurchaseError> {
        let result = sqlx::query(
            r#"
            UPDATE purchases
            SET state = $1, provider_order_id = $2, phone = $3, provider_cost = $4,
                expires_at = $5, updated_at = NOW()
            WHERE id = $6 AND state = $7
            "#,
        )
        .bind(PurchaseState::Active.id())
        .bind(&order.order_id)
        .bind(&order.phone)
        .bind(order.cost)
        .bind(order.expires_at)
        .bind(id.to_string())
        .bind(PurchaseState::Ordering.id())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_sms(
        &self,
        id: PurchaseId,
        code: Option<&str>,
        text: Option<&str>,
    ) -> Result<(), PurchaseError> {
        sqlx::query(
            r#"
            UPDATE purchases
            SET sms_code = $1, sms_text = $2, updated_at = NOW()
            WHERE id = $3 AND state = $4
            "#,
        )
        .bind(code)
        .bind(text)
        .bind(id.to_string())
        .bind(PurchaseState::Active.id())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_retry(&self, id: PurchaseId) -> Result<(), PurchaseError> {
        sqlx::query("UPDATE purchases SET retry_count = retry_count + 1 WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_stale(
        &self,
        threshold: Duration,
        limit: i64,
    ) -> Result<Vec<PurchaseRecord>, PurchaseError> {
        let rows = sqlx::query(&format!(
            r#"{SELECT_COLUMNS}
            WHERE state IN ($1, $2, $3, $4)
              AND updated_at < NOW() - INTERVAL '1 second' * $5
            ORDER BY updated_at ASC
            LIMIT $6
            "#
        ))
        .bind(PurchaseState::Pending.id())
        .bind(PurchaseState::Frozen.id())
        .bind(PurchaseState::Ordering.id())
        .bind(PurchaseState::Refunding.id())
        .bind(threshold.as_secs() as i64)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(&rows)
    }

    async fn find_active(&self, limit: i64) -> Result<Vec<PurchaseRecord>, PurchaseError> {
        let rows = sqlx::query(&format!(
            "{SELECT_COLUMNS} WHERE state = $1 ORDER BY updated_at ASC LIMIT $2"
        ))
        .bind(PurchaseState::Active.id())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(&rows)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        kind: Option<PurchaseKind>,
        limit: i64,
    ) -> Result<Vec<PurchaseRecord>, PurchaseError> {
        let rows = sqlx::query(&format!(
            r#"{SELECT_COLUMNS}
            WHERE user_id = $1 AND ($2::SMALLINT IS NULL OR kind = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#
        ))
        .bind(user_id)
        .bind(kind.map(|k| k.id()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_records(&rows)
    }

    async fn holding_totals(&self) -> Result<HashMap<Uuid, Decimal>, PurchaseError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, SUM(price) AS held
            FROM purchases
            WHERE state = ANY($1)
            GROUP BY user_id
            "#,
        )
        .bind(holding_state_ids())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let held: Option<Decimal> = row.get("held");
                (row.get("user_id"), held.unwrap_or_default())
            })
            .collect())
    }
}
