//! Repository layer for the `users` table

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::models::{User, UserRole};
use crate::payments::{AccountDirectory, PaymentError};

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get user by ID
    pub async fn get_by_id(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT id, email, role, balance, frozen_balance, referral_code, referred_by, created_at
               FROM users WHERE id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_user(&r)).transpose()
    }

    /// Completed deposits credited to a user
    pub async fn count_completed_deposits(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS n FROM transactions
               WHERE user_id = $1 AND type = 'deposit' AND status = 'completed'"#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        row.try_get("n")
    }
}

#[async_trait]
impl AccountDirectory for UserRepository {
    async fn referrer_of(&self, user_id: Uuid) -> Result<Option<Uuid>, PaymentError> {
        let user = self
            .get_by_id(user_id)
            .await
            .map_err(|e| PaymentError::Ledger(e.to_string()))?
            .ok_or_else(|| PaymentError::UnknownUser(user_id.to_string()))?;
        Ok(user.referred_by)
    }

    async fn completed_deposit_count(&self, user_id: Uuid) -> Result<i64, PaymentError> {
        self.count_completed_deposits(user_id)
            .await
            .map_err(|e| PaymentError::Ledger(e.to_string()))
    }
}

fn row_to_user(r: &sqlx::postgres::PgRow) -> Result<User, sqlx::Error> {
    let role: String = r.try_get("role")?;
    Ok(User {
        id: r.try_get("id")?,
        email: r.try_get("email")?,
        role: UserRole::parse(&role),
        balance: r.try_get("balance")?,
        frozen_balance: r.try_get("frozen_balance")?,
        referral_code: r.try_get("referral_code")?,
        referred_by: r.try_get("referred_by")?,
        created_at: r.try_get("created_at")?,
    })
}
