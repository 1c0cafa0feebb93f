//! Admin handlers (JWT role `admin`)

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
};

use crate::ledger::{Credit, LedgerError, TransactionKind};
use crate::reconcile::{ReconcileReport, Reconciler};

use super::super::auth::AuthUser;
use super::super::state::AppState;
use super::super::types::{
    AdminCreditRequest, ApiError, ApiResult, CreditResponse, PurchaseView, error_codes, ok,
};
use super::helpers::{parse_amount, parse_purchase_id, validate};

fn reconciler(state: &AppState) -> Result<&Arc<Reconciler>, ApiError> {
    state
        .reconciler
        .as_ref()
        .ok_or_else(|| ApiError::service_unavailable("Reconciliation needs PostgreSQL"))
}

/// Credit a user's balance by hand
///
/// Idempotent by `reference`.
#[utoipa::path(
    post,
    path = "/api/v1/admin/credit",
    request_body = AdminCreditRequest,
    responses(
        (status = 200, description = "Credited", body = CreditResponse),
        (status = 400, description = "Invalid amount or unknown user"),
        (status = 403, description = "Admin role required"),
        (status = 409, description = "Reference already used for another user or amount")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn admin_credit(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Json(req): Json<AdminCreditRequest>,
) -> ApiResult<CreditResponse> {
    validate(&req)?;
    let amount = parse_amount(&req.amount, state.decimals)?;

    let credit = Credit {
        user_id: req.user_id,
        amount,
        source: TransactionKind::AdminCredit,
        reference: req.reference,
        description: req
            .description
            .unwrap_or_else(|| format!("admin credit by {}", admin.user_id)),
    };

    match state.ledger.credit(&credit).await {
        Ok(receipt) => {
            tracing::info!(
                admin_id = %admin.user_id,
                user_id = %credit.user_id,
                amount = %amount,
                replayed = receipt.replayed,
                "Admin credit"
            );
            ok(CreditResponse {
                user_id: receipt.user_id,
                amount: receipt.amount,
                balance: receipt.after.balance,
                replayed: receipt.replayed,
            })
        }
        Err(LedgerError::UserNotFound(id)) => ApiError::new(
            axum::http::StatusCode::BAD_REQUEST,
            error_codes::USER_NOT_FOUND,
            format!("User not found: {}", id),
        )
        .into_err(),
        Err(e @ LedgerError::ReferenceConflict { .. }) => ApiError::new(
            axum::http::StatusCode::CONFLICT,
            error_codes::REFERENCE_CONFLICT,
            e.to_string(),
        )
        .into_err(),
        Err(e) => {
            tracing::error!(user_id = %credit.user_id, error = %e, "Admin credit failed");
            ApiError::internal("Credit failed").into_err()
        }
    }
}

/// Dry run: report phantom frozen drift without changing anything
#[utoipa::path(
    get,
    path = "/api/v1/admin/reconcile",
    responses(
        (status = 200, description = "Drift report", body = ReconcileReport),
        (status = 403, description = "Admin role required"),
        (status = 503, description = "No database")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn reconcile_report(State(state): State<Arc<AppState>>) -> ApiResult<ReconcileReport> {
    let report = reconciler(&state)?.scan().await?;
    ok(report)
}

/// Settle stranded holds and rebase drifted frozen balances
#[utoipa::path(
    post,
    path = "/api/v1/admin/reconcile",
    responses(
        (status = 200, description = "Applied", body = ReconcileReport),
        (status = 403, description = "Admin role required"),
        (status = 503, description = "No database")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn reconcile_apply(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
) -> ApiResult<ReconcileReport> {
    tracing::warn!(admin_id = %admin.user_id, "Reconciliation requested");
    let report = reconciler(&state)?.run().await?;
    ok(report)
}

/// Force-refund a purchase that is not closed yet
#[utoipa::path(
    post,
    path = "/api/v1/admin/purchases/{id}/refund",
    params(("id" = String, Path, description = "Purchase id")),
    responses(
        (status = 200, description = "Refunded", body = PurchaseView),
        (status = 404, description = "Not found"),
        (status = 409, description = "Already closed")
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn admin_refund(
    State(state): State<Arc<AppState>>,
    Extension(admin): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<PurchaseView> {
    let id = parse_purchase_id(&id)?;
    tracing::warn!(admin_id = %admin.user_id, purchase_id = %id, "Admin refund requested");
    let record = state.coordinator.admin_refund(id).await?;
    ok(record.into())
}
