//! Rental handlers (leased number with an inbox)

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
};

use crate::providers::SmsMessage;
use crate::purchase::{PurchaseKind, PurchaseRequest};

use super::super::auth::AuthUser;
use super::super::state::AppState;
use super::super::types::{ApiResult, CreateRentalRequest, PurchaseView, ok};
use super::helpers::{expect_kind, parse_optional_amount, parse_purchase_id, validate};

/// Rent a number for `hours`
#[utoipa::path(
    post,
    path = "/api/v1/rentals",
    request_body = CreateRentalRequest,
    responses(
        (status = 200, description = "Number leased (or pending)", body = PurchaseView),
        (status = 400, description = "Invalid parameters"),
        (status = 422, description = "Insufficient balance, no numbers, or provider refusal"),
        (status = 503, description = "Provider unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Rentals"
)]
pub async fn create_rental(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateRentalRequest>,
) -> ApiResult<PurchaseView> {
    validate(&req)?;
    let max_price = parse_optional_amount(req.max_price.as_deref(), state.decimals)?;

    let mut request = PurchaseRequest::rental(
        user.user_id,
        req.provider,
        &req.service,
        &req.country,
        req.hours,
    );
    request.max_price = max_price;
    request.cid = req.cid;

    let record = state.coordinator.purchase(request).await?;
    ok(record.into())
}

#[utoipa::path(
    get,
    path = "/api/v1/rentals/{id}",
    params(("id" = String, Path, description = "Purchase id")),
    responses(
        (status = 200, description = "Rental", body = PurchaseView),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Rentals"
)]
pub async fn get_rental(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<PurchaseView> {
    let id = parse_purchase_id(&id)?;
    let record = expect_kind(
        state.coordinator.get_for_user(id, user.user_id).await?,
        PurchaseKind::Rental,
    )?;
    ok(record.into())
}

/// Inbox of a rental; live from the provider while the lease runs
#[utoipa::path(
    get,
    path = "/api/v1/rentals/{id}/messages",
    params(("id" = String, Path, description = "Purchase id")),
    responses(
        (status = 200, description = "Messages", body = Vec<SmsMessage>),
        (status = 403, description = "Not the owner"),
        (status = 503, description = "Provider unavailable")
    ),
    security(("bearer_auth" = [])),
    tag = "Rentals"
)]
pub async fn get_rental_messages(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Vec<SmsMessage>> {
    let id = parse_purchase_id(&id)?;
    expect_kind(
        state.coordinator.get_for_user(id, user.user_id).await?,
        PurchaseKind::Rental,
    )?;
    let messages = state.coordinator.messages(id, user.user_id).await?;
    ok(messages)
}

#[utoipa::path(
    post,
    path = "/api/v1/rentals/{id}/cancel",
    params(("id" = String, Path, description = "Purchase id")),
    responses(
        (status = 200, description = "Cancelled", body = PurchaseView),
        (status = 409, description = "Not cancellable in its current state")
    ),
    security(("bearer_auth" = [])),
    tag = "Rentals"
)]
pub async fn cancel_rental(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<PurchaseView> {
    let id = parse_purchase_id(&id)?;
    expect_kind(
        state.coordinator.get_for_user(id, user.user_id).await?,
        PurchaseKind::Rental,
    )?;
    let record = state.coordinator.cancel(id, user.user_id).await?;
    ok(record.into())
}
