//! Payment gateway webhooks
//!
//! Unauthenticated routes; each body is verified by its gateway before
//! anything is credited. Redeliveries answer 200 so gateways stop retrying.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
};

use crate::payments::{PaymentOutcome, wave};

use super::super::state::AppState;
use super::super::types::{ApiResult, WebhookAck, ok};

fn ack(outcome: PaymentOutcome) -> WebhookAck {
    match outcome {
        PaymentOutcome::Credited {
            receipt,
            referral_bonus,
        } => WebhookAck {
            status: "credited",
            amount: Some(receipt.amount),
            referral_bonus,
        },
        PaymentOutcome::AlreadyProcessed => WebhookAck {
            status: "already_processed",
            amount: None,
            referral_bonus: None,
        },
        PaymentOutcome::Ignored => WebhookAck {
            status: "ignored",
            amount: None,
            referral_bonus: None,
        },
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/moneyfusion",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Processed", body = WebhookAck),
        (status = 400, description = "Malformed notification"),
        (status = 402, description = "Gateway does not confirm the payment"),
        (status = 404, description = "Gateway not configured")
    ),
    tag = "Webhooks"
)]
pub async fn moneyfusion_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    let outcome = state.payments.receive_moneyfusion(&body).await.map_err(|e| {
        tracing::warn!(gateway = "moneyfusion", error = %e, "Webhook rejected");
        e
    })?;
    ok(ack(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/paydunya",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Processed", body = WebhookAck),
        (status = 401, description = "Hash mismatch"),
        (status = 404, description = "Gateway not configured")
    ),
    tag = "Webhooks"
)]
pub async fn paydunya_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    let outcome = state.payments.receive_paydunya(&body).await.map_err(|e| {
        tracing::warn!(gateway = "paydunya", error = %e, "Webhook rejected");
        e
    })?;
    ok(ack(outcome))
}

#[utoipa::path(
    post,
    path = "/api/v1/webhooks/wave",
    request_body(content = String, content_type = "application/json"),
    params(("Wave-Signature" = String, Header, description = "t=<unix>,v1=<hex hmac-sha256>")),
    responses(
        (status = 200, description = "Processed", body = WebhookAck),
        (status = 401, description = "Bad or expired signature"),
        (status = 404, description = "Gateway not configured")
    ),
    tag = "Webhooks"
)]
pub async fn wave_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    let signature = headers
        .get(wave::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let outcome = state
        .payments
        .receive_wave(signature, &body)
        .await
        .map_err(|e| {
            tracing::warn!(gateway = "wave", error = %e, "Webhook rejected");
            e
        })?;
    ok(ack(outcome))
}
