//! Activation handlers (one number, one code)

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};

use crate::purchase::{PurchaseKind, PurchaseRequest, PurchaseState};

use super::super::auth::AuthUser;
use super::super::state::AppState;
use super::super::types::{ApiResult, CreateActivationRequest, ListQuery, PurchaseView, ok};
use super::helpers::{expect_kind, parse_optional_amount, parse_purchase_id, validate};

/// Buy an activation number
///
/// The price is held, the provider is asked for a number, and the purchase
/// comes back ACTIVE. A refused order releases the hold and returns the
/// refusal; an unknown outcome returns the purchase still pending.
#[utoipa::path(
    post,
    path = "/api/v1/activations",
    request_body = CreateActivationRequest,
    responses(
        (status = 200, description = "Number issued (or pending)", body = PurchaseView),
        (status = 400, description = "Invalid parameters or price above max_price"),
        (status = 401, description = "Unauthorized"),
        (status = 422, description = "Insufficient balance, no numbers, or provider refusal"),
        (status = 503, description = "Provider unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Activations"
)]
pub async fn create_activation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateActivationRequest>,
) -> ApiResult<PurchaseView> {
    validate(&req)?;
    let max_price = parse_optional_amount(req.max_price.as_deref(), state.decimals)?;

    let mut request =
        PurchaseRequest::activation(user.user_id, req.provider, &req.service, &req.country);
    request.max_price = max_price;
    request.cid = req.cid;

    let record = state.coordinator.purchase(request).await?;
    ok(record.into())
}

/// Activations of the caller, newest first
#[utoipa::path(
    get,
    path = "/api/v1/activations",
    params(ListQuery),
    responses(
        (status = 200, description = "Activations", body = Vec<PurchaseView>),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Activations"
)]
pub async fn list_activations(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<PurchaseView>> {
    validate(&query)?;
    let records = state
        .coordinator
        .list_for_user(user.user_id, Some(PurchaseKind::Activation), query.limit())
        .await?;
    ok(records.into_iter().map(PurchaseView::from).collect())
}

/// One activation; an ACTIVE one is checked with its provider first
#[utoipa::path(
    get,
    path = "/api/v1/activations/{id}",
    params(("id" = String, Path, description = "Purchase id")),
    responses(
        (status = 200, description = "Activation", body = PurchaseView),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Activations"
)]
pub async fn get_activation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<PurchaseView> {
    let id = parse_purchase_id(&id)?;
    let record = expect_kind(
        state.coordinator.get_for_user(id, user.user_id).await?,
        PurchaseKind::Activation,
    )?;

    if record.state != PurchaseState::Active {
        return ok(record.into());
    }
    match state.coordinator.poll(id).await {
        Ok(fresh) => ok(fresh.into()),
        Err(e) => {
            tracing::warn!(purchase_id = %id, error = %e, "Poll on read failed");
            ok(record.into())
        }
    }
}

/// Cancel an ACTIVE activation and release its hold
#[utoipa::path(
    post,
    path = "/api/v1/activations/{id}/cancel",
    params(("id" = String, Path, description = "Purchase id")),
    responses(
        (status = 200, description = "Cancelled", body = PurchaseView),
        (status = 403, description = "Not the owner"),
        (status = 409, description = "Not cancellable in its current state"),
        (status = 422, description = "Provider refused the cancellation")
    ),
    security(("bearer_auth" = [])),
    tag = "Activations"
)]
pub async fn cancel_activation(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<PurchaseView> {
    let id = parse_purchase_id(&id)?;
    expect_kind(
        state.coordinator.get_for_user(id, user.user_id).await?,
        PurchaseKind::Activation,
    )?;
    let record = state.coordinator.cancel(id, user.user_id).await?;
    ok(record.into())
}
