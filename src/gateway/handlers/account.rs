//! Account handlers: balance and transaction history

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Query, State},
};

use crate::ledger::{BalanceView, PgLedger, TransactionRecord};

use super::super::auth::AuthUser;
use super::super::state::AppState;
use super::super::types::{ApiError, ApiResult, ListQuery, ok};
use super::helpers::validate;

/// Balance of the caller
#[utoipa::path(
    get,
    path = "/api/v1/account/balance",
    responses(
        (status = 200, description = "Current balance", body = BalanceView),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Unknown user")
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<BalanceView> {
    let view = state
        .ledger
        .snapshot(user.user_id)
        .await
        .map_err(crate::purchase::PurchaseError::from)?;
    ok(view)
}

/// Transactions of the caller, newest first
#[utoipa::path(
    get,
    path = "/api/v1/account/transactions",
    params(ListQuery),
    responses(
        (status = 200, description = "Transaction history", body = Vec<TransactionRecord>),
        (status = 401, description = "Unauthorized"),
        (status = 503, description = "History not available")
    ),
    security(("bearer_auth" = [])),
    tag = "Account"
)]
pub async fn get_transactions(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<TransactionRecord>> {
    validate(&query)?;
    let db = state
        .pg_db
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Transaction history not available"))?;

    match PgLedger::new(db.pool().clone())
        .list_transactions(user.user_id, query.limit())
        .await
    {
        Ok(rows) => ok(rows),
        Err(e) => {
            tracing::error!(user_id = %user.user_id, error = %e, "Transaction query failed");
            ApiError::internal("Transaction query failed").into_err()
        }
    }
}
