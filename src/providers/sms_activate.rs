//! SMS-Activate
//!
//! `handler_api.php` answers activations in plaintext
//! (`ACCESS_NUMBER:<id>:<phone>`, `STATUS_OK:<code>`, bare error codes) and
//! rentals in JSON (`{"status": "success" | "error", ...}`).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use super::error::ProviderError;
use super::http::{build_client, get_text, snippet, value_to_string};
use super::{ActivationStatus, OrderRef, ProviderKind, ProviderOrder, SmsMessage, SmsProvider};
use crate::config::ProviderSettings;

pub const DEFAULT_BASE_URL: &str = "https://api.sms-activate.org/stubs/handler_api.php";

/// `setStatus` values
const STATUS_FINISH: &str = "6";
const STATUS_CANCEL: &str = "8";
/// `setRentStatus` value for cancellation
const RENT_STATUS_CANCEL: &str = "2";

pub struct SmsActivateClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SmsActivateClient {
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
            .query(&[("api_key", self.api_key.as_str())])
            .query(params);
        let (status, body) = get_text(request).await?;
        debug!(provider = "sms_activate", action = ?params.first(), status, "Provider response");
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
impl SmsProvider for SmsActivateClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SmsActivate
    }

    async fn buy_activation(
        &self,
        service: &str,
        country: &str,
    ) -> Result<ProviderOrder, ProviderError> {
        let body = self
            .call(&[
                ("action", "getNumber"),
                ("service", service),
                ("country", country),
            ])
            .await?;
        parse_number_response(&body)
    }

    async fn check_activation(&self, order: &OrderRef) -> Result<ActivationStatus, ProviderError> {
        let body = self
            .call(&[("action", "getStatus"), ("id", &order.order_id)])
            .await?;
        parse_status_response(&body)
    }

    async fn cancel_activation(&self, order: &OrderRef) -> Result<(), ProviderError> {
        let body = self
            .call(&[
                ("action", "setStatus"),
                ("id", &order.order_id),
                ("status", STATUS_CANCEL),
            ])
            .await?;
        parse_set_status_response(&body)
    }

    async fn finish_activation(&self, order: &OrderRef) -> Result<(), ProviderError> {
        let body = self
            .call(&[
                ("action", "setStatus"),
                ("id", &order.order_id),
                ("status", STATUS_FINISH),
            ])
            .await?;
        parse_set_status_response(&body)
    }

    async fn rent_number(
        &self,
        service: &str,
        country: &str,
        hours: u32,
    ) -> Result<ProviderOrder, ProviderError> {
        let hours = hours.to_string();
        let body = self
            .call(&[
                ("action", "getRentNumber"),
                ("service", service),
                ("country", country),
                ("rent_time", &hours),
            ])
            .await?;
        parse_rent_number(&body)
    }

    async fn rent_messages(&self, order: &OrderRef) -> Result<Vec<SmsMessage>, ProviderError> {
        let body = self
            .call(&[("action", "getRentStatus"), ("id", &order.order_id)])
            .await?;
        parse_rent_status(&body)
    }

    async fn cancel_rent(&self, order: &OrderRef) -> Result<(), ProviderError> {
        let body = self
            .call(&[
                ("action", "setRentStatus"),
                ("id", &order.order_id),
                ("status", RENT_STATUS_CANCEL),
            ])
            .await?;
        parse_rent_ack(&body)
    }
}

// ============================================================================
// Parsers
// ============================================================================

/// Map a bare SMS-Activate error code
pub fn classify_error(code: &str) -> ProviderError {
    let code = code.trim();
    match code {
        "NO_NUMBERS" => ProviderError::NoNumbers,
        "NO_BALANCE" => ProviderError::NoBalance,
        "BAD_KEY" | "NO_KEY" => ProviderError::BadKey,
        "ERROR_SQL" | "" => ProviderError::Unexpected(format!("server answered {code:?}")),
        c if c
            .chars()
            .next()
            .is_some_and(|first| first.is_ascii_uppercase())
            && c.chars()
                .take_while(|ch| *ch != ':')
                .all(|ch| ch.is_ascii_uppercase() || ch == '_') =>
        {
            ProviderError::Rejected(c.to_string())
        }
        other => ProviderError::Unexpected(snippet(other)),
    }
}

/// `ACCESS_NUMBER:<id>:<phone>`
pub fn parse_number_response(body: &str) -> Result<ProviderOrder, ProviderError> {
    let body = body.trim();
    if let Some(rest) = body.strip_prefix("ACCESS_NUMBER:") {
        let (id, phone) = rest
            .split_once(':')
            .ok_or_else(|| ProviderError::Unexpected(snippet(body)))?;
        if id.is_empty() || phone.is_empty() {
            return Err(ProviderError::Unexpected(snippet(body)));
        }
        return Ok(ProviderOrder {
            order_id: id.to_string(),
            phone: normalize_phone(phone),
            cost: None,
            expires_at: None,
        });
    }
    Err(classify_error(body))
}

pub fn parse_status_response(body: &str) -> Result<ActivationStatus, ProviderError> {
    let body = body.trim();
    match body {
        "STATUS_WAIT_CODE" | "STATUS_WAIT_RESEND" => return Ok(ActivationStatus::Waiting),
        "STATUS_CANCEL" => return Ok(ActivationStatus::Cancelled),
        "NO_ACTIVATION" => return Ok(ActivationStatus::Expired),
        _ => {}
    }

    let code = body
        .strip_prefix("STATUS_OK:")
        .or_else(|| body.strip_prefix("STATUS_WAIT_RETRY:"));
    match code {
        Some(code) if !code.trim().is_empty() => Ok(ActivationStatus::Received {
            code: code.trim().to_string(),
            text: None,
        }),
        _ => Err(classify_error(body)),
    }
}

pub fn parse_set_status_response(body: &str) -> Result<(), ProviderError> {
    match body.trim() {
        "ACCESS_READY" | "ACCESS_RETRY_GET" | "ACCESS_ACTIVATION" | "ACCESS_CANCEL" => Ok(()),
        other => Err(classify_error(other)),
    }
}

#[derive(Debug, Deserialize)]
struct RentEnvelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    phone: Option<RentPhone>,
    #[serde(default)]
    values: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RentPhone {
    id: Value,
    number: Value,
    #[serde(default, rename = "endDate")]
    end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RentSms {
    #[serde(default, rename = "phoneFrom")]
    phone_from: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

fn parse_rent_envelope(body: &str) -> Result<RentEnvelope, ProviderError> {
    serde_json::from_str(body.trim()).map_err(|_| classify_error(body))
}

pub fn parse_rent_number(body: &str) -> Result<ProviderOrder, ProviderError> {
    let envelope = parse_rent_envelope(body)?;
    if envelope.status != "success" {
        return Err(classify_error(envelope.message.as_deref().unwrap_or("")));
    }
    let phone = envelope
        .phone
        .ok_or_else(|| ProviderError::Unexpected(snippet(body)))?;
    let order_id =
        value_to_string(&phone.id).ok_or_else(|| ProviderError::Unexpected(snippet(body)))?;
    let number =
        value_to_string(&phone.number).ok_or_else(|| ProviderError::Unexpected(snippet(body)))?;

    Ok(ProviderOrder {
        order_id,
        phone: normalize_phone(&number),
        cost: None,
        expires_at: phone.end_date.as_deref().and_then(parse_provider_time),
    })
}

/// Inbox of a rental; "no messages yet" is an empty inbox, not an error
pub fn parse_rent_status(body: &str) -> Result<Vec<SmsMessage>, ProviderError> {
    let envelope = parse_rent_envelope(body)?;
    if envelope.status != "success" {
        return match envelope.message.as_deref() {
            Some("STATUS_WAIT_CODE") | Some("STATUS_CANCEL") | Some("STATUS_FINISH") => {
                Ok(Vec::new())
            }
            other => Err(classify_error(other.unwrap_or(""))),
        };
    }

    let values: BTreeMap<String, RentSms> = match envelope.values {
        Some(v @ Value::Object(_)) => serde_json::from_value(v)
            .map_err(|e| ProviderError::Unexpected(format!("rent values: {e}")))?,
        _ => BTreeMap::new(),
    };

    let mut indexed: Vec<(u64, RentSms)> = values
        .into_iter()
        .map(|(k, v)| (k.parse::<u64>().unwrap_or(u64::MAX), v))
        .collect();
    indexed.sort_by_key(|(k, _)| *k);

    Ok(indexed
        .into_iter()
        .filter_map(|(_, sms)| {
            let text = sms.text?;
            Some(SmsMessage::new(sms.phone_from, text, sms.date))
        })
        .collect())
}

pub fn parse_rent_ack(body: &str) -> Result<(), ProviderError> {
    let envelope = parse_rent_envelope(body)?;
    if envelope.status == "success" {
        return Ok(());
    }
    match envelope.message.as_deref() {
        Some("ALREADY_CANCEL") => Ok(()),
        other => Err(classify_error(other.unwrap_or(""))),
    }
}

fn normalize_phone(raw: &str) -> String {
    let digits = raw.trim().trim_start_matches('+');
    format!("+{digits}")
}

/// `2024-01-30 14:31:25` or `2024-01-30T14:31:25`, read as UTC
fn parse_provider_time(raw: &str) -> Option<DateTime<Utc>> {
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
        .map(|naive| naive.and_utc())
}
