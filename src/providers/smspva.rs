//! SMSPVA
//!
//! `priemnik.php?metod=...` answers JSON with a `response` code that is
//! sometimes a string and sometimes a number. Status calls need the original
//! country and service, not just the order id.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::error::ProviderError;
use super::http::{build_client, get_text, snippet, value_to_string};
use super::{ActivationStatus, OrderRef, ProviderKind, ProviderOrder, SmsProvider};
use crate::config::ProviderSettings;

pub const DEFAULT_BASE_URL: &str = "https://smspva.com/priemnik.php";

pub struct SmspvaClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SmspvaResponse {
    #[serde(default)]
    response: Value,
    #[serde(default)]
    number: Option<Value>,
    #[serde(default, rename = "CountryCode")]
    country_code: Option<String>,
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    sms: Option<Value>,
    #[serde(default)]
    error_msg: Option<String>,
}

impl SmspvaResponse {
    fn code(&self) -> String {
        value_to_string(&self.response).unwrap_or_default()
    }
}

impl SmspvaClient {
    pub fn new(settings: &ProviderSettings) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(settings.timeout())?,
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: settings.api_key.clone(),
        })
    }

    async fn call(&self, params: &[(&str, &str)]) -> Result<String, ProviderError> {
        let request = self
            .http
            .get(&self.base_url)
            .query(params)
            .query(&[("apikey", self.api_key.as_str())]);
        let (status, body) = get_text(request).await?;
        debug!(provider = "smspva", metod = ?params.first(), status, "Provider response");
        if status >= 500 {
            return Err(ProviderError::Transport(format!(
                "HTTP {}: {}",
                status,
                snippet(&body)
            )));
        }
        Ok(body)
    }
}

#[async_trait]
impl SmsProvider for SmspvaClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Smspva
    }

    async fn buy_activation(
        &self,
        service: &str,
        country: &str,
    ) -> Result<ProviderOrder, ProviderError> {
        let body = self
            .call(&[
                ("metod", "get_number"),
                ("country", country),
                ("service", service),
            ])
            .await?;
        parse_number_response(&body)
    }

    async fn check_activation(&self, order: &OrderRef) -> Result<ActivationStatus, ProviderError> {
        let body = self
            .call(&[
                ("metod", "get_sms"),
                ("country", &order.country),
                ("service", &order.service),
                ("id", &order.order_id),
            ])
            .await?;
        parse_sms_response(&body)
    }

    async fn cancel_activation(&self, order: &OrderRef) -> Result<(), ProviderError> {
        let body = self
            .call(&[
                ("metod", "denial"),
                ("country", &order.country),
                ("service", &order.service),
                ("id", &order.order_id),
            ])
            .await?;
        parse_ack(&body)
    }

    /// SMSPVA closes an order by itself once the code is read
    async fn finish_activation(&self, _order: &OrderRef) -> Result<(), ProviderError> {
        Ok(())
    }
}

// ============================================================================
// Parsers
// ============================================================================

fn decode(body: &str) -> Result<SmspvaResponse, ProviderError> {
    serde_json::from_str(body.trim())
        .map_err(|_| ProviderError::Unexpected(format!("smspva: {}", snippet(body))))
}

fn classify(resp: &SmspvaResponse) -> ProviderError {
    let msg = resp.error_msg.clone().unwrap_or_default();
    let lower = msg.to_ascii_lowercase();
    match resp.code().as_str() {
        "2" => ProviderError::NoNumbers,
        "5" => ProviderError::Rejected("request rate limit exceeded".into()),
        "6" => ProviderError::Rejected("account temporarily banned".into()),
        "7" => ProviderError::Rejected("too many concurrent numbers".into()),
        _ if lower.contains("api key") || lower.contains("apikey") => ProviderError::BadKey,
        _ if lower.contains("balance") => ProviderError::NoBalance,
        _ if !msg.is_empty() => ProviderError::Rejected(msg),
        code => ProviderError::Unexpected(format!("smspva response code {code:?}")),
    }
}

pub fn parse_number_response(body: &str) -> Result<ProviderOrder, ProviderError> {
    let resp = decode(body)?;
    if resp.code() != "1" {
        return Err(classify(&resp));
    }
    let order_id = resp
        .id
        .as_ref()
        .and_then(value_to_string)
        .ok_or_else(|| ProviderError::Unexpected(snippet(body)))?;
    let number = resp
        .number
        .as_ref()
        .and_then(value_to_string)
        .ok_or_else(|| ProviderError::Unexpected(snippet(body)))?;
    let prefix = resp
        .country_code
        .as_deref()
        .unwrap_or("+")
        .trim_start_matches('+');

    Ok(ProviderOrder {
        order_id,
        phone: format!("+{prefix}{number}"),
        cost: None,
        expires_at: None,
    })
}

pub fn parse_sms_response(body: &str) -> Result<ActivationStatus, ProviderError> {
    let resp = decode(body)?;
    match resp.code().as_str() {
        "1" => match resp.sms.as_ref().and_then(value_to_string) {
            Some(code) => Ok(ActivationStatus::Received { code, text: None }),
            None => Ok(ActivationStatus::Waiting),
        },
        "2" => Ok(ActivationStatus::Waiting),
        "3" => Ok(ActivationStatus::Expired),
        _ => Err(classify(&resp)),
    }
}

pub fn parse_ack(body: &str) -> Result<(), ProviderError> {
    let resp = decode(body)?;
    match resp.code().as_str() {
        "1" => Ok(()),
        // already closed upstream
        "2" | "3" => Ok(()),
        _ => Err(classify(&resp)),
    }
}
