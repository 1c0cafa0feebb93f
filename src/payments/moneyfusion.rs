//! MoneyFusion
//!
//! Notifications are unsigned, so a completed payin is confirmed by asking
//! the gateway for the status of its `tokenPay` before anything is credited.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::PaymentError;
use super::{Gateway, VerifiedPayment, decimal_field, user_field};
use crate::config::MoneyFusionSettings;

pub const COMPLETED_EVENT: &str = "payin.session.completed";

#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    pub event: String,
    #[serde(rename = "tokenPay")]
    pub token_pay: String,
    #[serde(rename = "Montant")]
    pub amount: Value,
    #[serde(rename = "personal_Info", default)]
    pub personal_info: Vec<PersonalInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonalInfo {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// What the gateway says about a payment token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub paid: bool,
    pub amount: Option<Decimal>,
}

/// Second opinion on a notification
#[async_trait]
pub trait PaymentVerifier: Send + Sync {
    async fn status(&self, token: &str) -> Result<RemoteStatus, PaymentError>;
}

/// `GET {status_url}/{token}`
pub struct HttpStatusChecker {
    http: reqwest::Client,
    status_url: String,
}

impl HttpStatusChecker {
    pub fn new(status_url: &str, timeout: Duration) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Upstream(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            status_url: status_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PaymentVerifier for HttpStatusChecker {
    async fn status(&self, token: &str) -> Result<RemoteStatus, PaymentError> {
        let response = self
            .http
            .get(format!("{}/{}", self.status_url, token))
            .send()
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;
        let status = response.status().as_u16();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PaymentError::Upstream(e.to_string()))?;
        debug!(gateway = "moneyfusion", status, "Status check response");
        parse_status(&body)
    }
}

/// `{"statut": true, "data": {"statut": "paid", "Montant": 1000}}`
pub fn parse_status(body: &Value) -> Result<RemoteStatus, PaymentError> {
    if body.get("statut").and_then(Value::as_bool) != Some(true) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown token");
        return Err(PaymentError::Unconfirmed(message.to_string()));
    }
    let data = body
        .get("data")
        .ok_or_else(|| PaymentError::Unconfirmed("status without data".into()))?;

    Ok(RemoteStatus {
        paid: data.get("statut").and_then(Value::as_str) == Some("paid"),
        amount: data
            .get("Montant")
            .and_then(|v| decimal_field(v, "Montant").ok()),
    })
}

pub struct MoneyFusion {
    /// `None` trusts notifications as sent (sandbox only)
    verifier: Option<Arc<dyn PaymentVerifier>>,
}

impl MoneyFusion {
    pub fn new(verifier: Option<Arc<dyn PaymentVerifier>>) -> Self {
        Self { verifier }
    }

    pub fn from_settings(settings: &MoneyFusionSettings) -> Result<Self, PaymentError> {
        if !settings.verify_remote {
            warn!(gateway = "moneyfusion", "Remote verification disabled; notifications are trusted");
            return Ok(Self::new(None));
        }
        let checker = HttpStatusChecker::new(&settings.status_url, Duration::from_secs(15))?;
        Ok(Self::new(Some(Arc::new(checker))))
    }

    pub async fn verify(&self, body: &[u8]) -> Result<VerifiedPayment, PaymentError> {
        let notification: Notification = serde_json::from_slice(body)?;
        let mut payment = interpret(&notification)?;

        if payment.settled
            && let Some(verifier) = &self.verifier
        {
            let remote = verifier.status(&payment.reference).await?;
            if !remote.paid {
                return Err(PaymentError::Unconfirmed(format!(
                    "token {} is not paid",
                    payment.reference
                )));
            }
            if let Some(amount) = remote.amount
                && amount != payment.amount
            {
                warn!(
                    gateway = "moneyfusion",
                    reference = %payment.reference,
                    notified = %payment.amount,
                    confirmed = %amount,
                    "Amount differs from notification; using confirmed amount"
                );
                payment.amount = amount;
            }
        }
        Ok(payment)
    }
}

/// Notification fields without any remote check
pub fn interpret(notification: &Notification) -> Result<VerifiedPayment, PaymentError> {
    if notification.token_pay.trim().is_empty() {
        return Err(PaymentError::InvalidPayload("tokenPay is empty".into()));
    }
    let user = notification
        .personal_info
        .first()
        .and_then(|info| info.user_id.as_deref())
        .ok_or_else(|| PaymentError::InvalidPayload("personal_Info[0].userId missing".into()))?;

    Ok(VerifiedPayment {
        gateway: Gateway::MoneyFusion,
        reference: notification.token_pay.trim().to_string(),
        user_id: user_field(user)?,
        amount: decimal_field(&notification.amount, "Montant")?,
        settled: notification.event == COMPLETED_EVENT,
    })
}
