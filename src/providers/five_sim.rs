//! 5sim
//!
//! JSON API with bearer auth. Errors come back as short plaintext bodies
//! (`no free phones`, `not enough user balance`) rather than JSON.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Deserialize;
use tracing::debug;

use super::error::ProviderError;
use super::http::{build_client, get_text, snippet};
use super::{ActivationStatus, OrderRef, ProviderKind, ProviderOrder, SmsMessage, SmsProvider};
use crate::config::ProviderSettings;

pub const DEFAULT_BASE_URL: &str = "https://5sim.net/v1";

pub struct FiveSimClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Order object returned by buy / check / cancel / finish
#[derive(Debug, Clone, Deserialize)]
pub struct FiveSimOrder {
    pub id: i64,
    pub phone: String,
    #[serde(default)]
    pub price: Option<f64>,
    pub status: String,
    #[serde(default)]
    pub expires: Option<String>,
    #[serde(default)]
    pub sms: Option<Vec<FiveSimSms>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FiveSimSms {
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl FiveSimClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(settings.timeout())?,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key: settings.api_key.clone(),
        })
    }

    async fn get(&self, path: &str) -> Result<FiveSimOrder, ProviderError> {
        let request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json");
        let (status, body) = get_text(request).await?;
        debug!(provider = "5sim", path = %path, status, "Provider response");
        parse_order(status, &body)
    }

    async fn buy(
        &self,
        category: &str,
        service: &str,
        country: &str,
    ) -> Result<ProviderOrder, ProviderError> {
        let order = self
            .get(&format!("/user/buy/{category}/{country}/any/{service}"))
            .await?;
        Ok(order.into_provider_order())
    }
}

#[async_trait]
impl SmsProvider for FiveSimClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::FiveSim
    }

    async fn buy_activation(
        &self,
        service: &str,
        country: &str,
    ) -> Result<ProviderOrder, ProviderError> {
        self.buy("activation", service, country).await
    }

    async fn check_activation(&self, order: &OrderRef) -> Result<ActivationStatus, ProviderError> {
        let order = self.get(&format!("/user/check/{}", order.order_id)).await?;
        Ok(activation_status(&order))
    }

    async fn cancel_activation(&self, order: &OrderRef) -> Result<(), ProviderError> {
        self.get(&format!("/user/cancel/{}", order.order_id))
            .await
            .map(|_| ())
            .or_else(already_closed)
    }

    async fn finish_activation(&self, order: &OrderRef) -> Result<(), ProviderError> {
        self.get(&format!("/user/finish/{}", order.order_id))
            .await
            .map(|_| ())
            .or_else(already_closed)
    }

    /// 5sim calls rentals "hosting"; the lease length is fixed by the product
    async fn rent_number(
        &self,
        service: &str,
        country: &str,
        hours: u32,
    ) -> Result<ProviderOrder, ProviderError> {
        debug!(provider = "5sim", hours, "Hosting lease length is set by the product");
        self.buy("hosting", service, country).await
    }

    async fn rent_messages(&self, order: &OrderRef) -> Result<Vec<SmsMessage>, ProviderError> {
        let order = self.get(&format!("/user/check/{}", order.order_id)).await?;
        Ok(order
            .sms
            .unwrap_or_default()
            .into_iter()
            .filter_map(|sms| {
                let text = sms.text?;
                let mut message = SmsMessage::new(sms.sender, text, sms.date);
                if sms.code.is_some() {
                    message.code = sms.code;
                }
                Some(message)
            })
            .collect())
    }

    async fn cancel_rent(&self, order: &OrderRef) -> Result<(), ProviderError> {
        self.cancel_activation(order).await
    }
}

/// Cancelling or finishing an order that is already closed is a no-op
fn already_closed(err: ProviderError) -> Result<(), ProviderError> {
    match err {
        ProviderError::Rejected(ref msg) if msg == "order has sms" => Err(err),
        ProviderError::Rejected(ref msg)
            if msg == "order expired" || msg == "order not found" || msg == "order is canceled" =>
        {
            Ok(())
        }
        other => Err(other),
    }
}

// ============================================================================
// Parsers
// ============================================================================

/// Classify a non-JSON 5sim body
pub fn classify_error(status: u16, body: &str) -> ProviderError {
    let message = body.trim().to_ascii_lowercase();
    if status == 401 || message.contains("unauthorized") {
        return ProviderError::BadKey;
    }
    if status >= 500 {
        return ProviderError::Transport(format!("HTTP {}: {}", status, snippet(body)));
    }
    match message.as_str() {
        "no free phones" => ProviderError::NoNumbers,
        "not enough user balance" | "not enough balance" => ProviderError::NoBalance,
        "" => ProviderError::Unexpected(format!("HTTP {status} with empty body")),
        m if m.starts_with('<') || m.starts_with('{') => ProviderError::Unexpected(snippet(body)),
        m => ProviderError::Rejected(m.to_string()),
    }
}

pub fn parse_order(status: u16, body: &str) -> Result<FiveSimOrder, ProviderError> {
    if !(200..300).contains(&status) || !body.trim_start().starts_with('{') {
        return Err(classify_error(status, body));
    }
    serde_json::from_str(body).map_err(|e| ProviderError::Unexpected(format!("5sim order: {e}")))
}

impl FiveSimOrder {
    pub fn into_provider_order(self) -> ProviderOrder {
        ProviderOrder {
            order_id: self.id.to_string(),
            phone: self.phone,
            cost: self
                .price
                .and_then(Decimal::from_f64)
                .map(|d| d.round_dp(4)),
            expires_at: self
                .expires
                .as_deref()
                .and_then(|e| DateTime::parse_from_rfc3339(e).ok())
                .map(|e| e.with_timezone(&Utc)),
        }
    }

    fn first_sms(&self) -> Option<&FiveSimSms> {
        self.sms.as_ref().and_then(|list| list.first())
    }
}

pub fn activation_status(order: &FiveSimOrder) -> ActivationStatus {
    if let Some(sms) = order.first_sms() {
        let code = sms
            .code
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| sms.text.as_deref().and_then(super::extract_code));
        if let Some(code) = code {
            return ActivationStatus::Received {
                code,
                text: sms.text.clone(),
            };
        }
    }

    match order.status.as_str() {
        "CANCELED" | "BANNED" => ActivationStatus::Cancelled,
        "TIMEOUT" | "FINISHED" => ActivationStatus::Expired,
        _ => ActivationStatus::Waiting,
    }
}
