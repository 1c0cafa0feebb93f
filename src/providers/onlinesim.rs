//! OnlineSIM
//!
//! `getNum.php` returns only an operation id (`tzid`); the number itself is
//! read back from `getState.php`, which answers `TZ_NUM_WAIT` until a message
//! arrives and `TZ_NUM_ANSWER` with the code afterwards.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::error::ProviderError;
use super::http::{build_client, get_text, snippet, value_to_string};
use super::{ActivationStatus, OrderRef, ProviderKind, ProviderOrder, SmsProvider};
use crate::config::ProviderSettings;

pub const DEFAULT_BASE_URL: &str = "https://onlinesim.io/api";

/// Attempts to read the number of a fresh operation
const NUMBER_LOOKUP_ATTEMPTS: usize = 3;

pub struct OnlineSimClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// One operation from `getState.php`
#[derive(Debug, Clone, Deserialize)]
pub struct OnlineSimState {
    #[serde(default)]
    pub response: Value,
    #[serde(default)]
    pub tzid: Option<Value>,
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub msg: Option<Value>,
    /// Seconds left on the operation
    #[serde(default)]
    pub time: Option<i64>,
}

impl OnlineSimClient {
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

    async fn call(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<String, ProviderError> {
        let request = self
            .http
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(params)
            .query(&[("apikey", self.api_key.as_str())]);
        let (status, body) = get_text(request).await?;
        debug!(provider = "onlinesim", endpoint = %endpoint, status, "Provider response");
        if status >= 500 {
            return Err(ProviderError::Transport(format!(
                "HTTP {}: {}",
                status,
                snippet(&body)
            )));
        }
        Ok(body)
    }

    async fn state(&self, tzid: &str) -> Result<OnlineSimState, ProviderError> {
        let body = self
            .call(
                "getState.php",
                &[("tzid", tzid), ("message_to_code", "1")],
            )
            .await?;
        parse_state(&body)
    }

    async fn close(&self, tzid: &str, ban: bool) -> Result<(), ProviderError> {
        let mut params = vec![("tzid", tzid)];
        if ban {
            params.push(("ban", "1"));
        }
        let body = self.call("setOperationOk.php", &params).await?;
        parse_ack(&body)
    }
}

#[async_trait]
impl SmsProvider for OnlineSimClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OnlineSim
    }

    async fn buy_activation(
        &self,
        service: &str,
        country: &str,
    ) -> Result<ProviderOrder, ProviderError> {
        let body = self
            .call("getNum.php", &[("service", service), ("country", country)])
            .await?;
        let tzid = parse_get_num(&body)?;

        // The operation exists from here on; failures below are ambiguous.
        for attempt in 1..=NUMBER_LOOKUP_ATTEMPTS {
            let state = self.state(&tzid).await?;
            if let Some(number) = state.number.filter(|n| !n.is_empty()) {
                return Ok(ProviderOrder {
                    order_id: tzid,
                    phone: number,
                    cost: None,
                    expires_at: state
                        .time
                        .map(|secs| Utc::now() + ChronoDuration::seconds(secs)),
                });
            }
            debug!(tzid = %tzid, attempt, "Number not assigned yet");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        warn!(tzid = %tzid, "OnlineSIM did not assign a number in time");
        Err(ProviderError::Unexpected(format!(
            "operation {tzid} has no number yet"
        )))
    }

    async fn check_activation(&self, order: &OrderRef) -> Result<ActivationStatus, ProviderError> {
        let state = self.state(&order.order_id).await?;
        state_to_status(&state)
    }

    async fn cancel_activation(&self, order: &OrderRef) -> Result<(), ProviderError> {
        self.close(&order.order_id, true).await
    }

    async fn finish_activation(&self, order: &OrderRef) -> Result<(), ProviderError> {
        self.close(&order.order_id, false).await
    }
}

// ============================================================================
// Parsers
// ============================================================================

pub fn classify_error(code: &str) -> ProviderError {
    match code {
        "NO_NUMBER" | "NO_NUMBER_FOR_FORWARD" => ProviderError::NoNumbers,
        "WARNING_LOW_BALANCE" | "NO_BALANCE" => ProviderError::NoBalance,
        "ERROR_WRONG_KEY" | "ERROR_NO_KEY" => ProviderError::BadKey,
        "" => ProviderError::Unexpected("empty response code".into()),
        other if other.starts_with("ERROR_") || other.starts_with("WARNING_") => {
            ProviderError::Rejected(other.to_string())
        }
        other => ProviderError::Unexpected(snippet(other)),
    }
}

/// `{"response": 1, "tzid": 1234567}`
pub fn parse_get_num(body: &str) -> Result<String, ProviderError> {
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|_| ProviderError::Unexpected(format!("onlinesim: {}", snippet(body))))?;
    let code = value.get("response").and_then(value_to_string).unwrap_or_default();
    if code != "1" {
        return Err(classify_error(&code));
    }
    value
        .get("tzid")
        .and_then(value_to_string)
        .ok_or_else(|| ProviderError::Unexpected(snippet(body)))
}

/// `getState.php` answers a list of operations or a bare error object
pub fn parse_state(body: &str) -> Result<OnlineSimState, ProviderError> {
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|_| ProviderError::Unexpected(format!("onlinesim: {}", snippet(body))))?;
    let first = match value {
        Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
        Value::Array(_) => {
            return Ok(OnlineSimState {
                response: Value::String("ERROR_NO_OPERATIONS".into()),
                tzid: None,
                number: None,
                msg: None,
                time: None,
            });
        }
        other => other,
    };
    serde_json::from_value(first).map_err(|e| ProviderError::Unexpected(format!("onlinesim: {e}")))
}

pub fn state_to_status(state: &OnlineSimState) -> Result<ActivationStatus, ProviderError> {
    let code = value_to_string(&state.response).unwrap_or_default();
    match code.as_str() {
        "TZ_NUM_WAIT" | "TZ_INPOOL" | "TZ_NUM_PREPARE" => Ok(ActivationStatus::Waiting),
        "TZ_NUM_ANSWER" | "TZ_OVER_OK" => match state.msg.as_ref().and_then(message_code) {
            Some(code) => Ok(ActivationStatus::Received { code, text: None }),
            None => Ok(ActivationStatus::Waiting),
        },
        "TZ_OVER_EMPTY" | "ERROR_NO_OPERATIONS" => Ok(ActivationStatus::Expired),
        "TZ_DELETED" => Ok(ActivationStatus::Cancelled),
        other => Err(classify_error(other)),
    }
}

/// `msg` is the code itself, or a list of `{msg: ...}` objects
fn message_code(msg: &Value) -> Option<String> {
    match msg {
        Value::Array(items) => items
            .last()
            .and_then(|m| m.get("msg"))
            .and_then(value_to_string),
        other => value_to_string(other),
    }
}

pub fn parse_ack(body: &str) -> Result<(), ProviderError> {
    let value: Value = serde_json::from_str(body.trim())
        .map_err(|_| ProviderError::Unexpected(format!("onlinesim: {}", snippet(body))))?;
    let code = value.get("response").and_then(value_to_string).unwrap_or_default();
    match code.as_str() {
        "1" | "ERROR_NO_OPERATIONS" => Ok(()),
        other => Err(classify_error(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get_num() {
        assert_eq!(
            parse_get_num(r#"{"response":1,"tzid":1234567}"#).unwrap(),
            "1234567"
        );
        assert_eq!(
            parse_get_num(r#"{"response":"NO_NUMBER"}"#).unwrap_err(),
            ProviderError::NoNumbers
        );
        assert_eq!(
            parse_get_num(r#"{"response":"WARNING_LOW_BALANCE"}"#).unwrap_err(),
            ProviderError::NoBalance
        );
        assert_eq!(
            parse_get_num(r#"{"response":"ERROR_WRONG_KEY"}"#).unwrap_err(),
            ProviderError::BadKey
        );
    }

    #[test]
    fn test_state_waiting_with_number() {
        let body = r#"[{"country":7,"sum":3,"service":"vkcom","number":"+79101234567","response":"TZ_NUM_WAIT","tzid":1234567,"time":583,"form":"index"}]"#;
        let state = parse_state(body).unwrap();
        assert_eq!(state.number.as_deref(), Some("+79101234567"));
        assert_eq!(state.time, Some(583));
        assert_eq!(state_to_status(&state).unwrap(), ActivationStatus::Waiting);
    }

    #[test]
    fn test_state_answer() {
        let body = r#"[{"number":"+79101234567","response":"TZ_NUM_ANSWER","msg":"58123","tzid":1234567,"time":400}]"#;
        let state = parse_state(body).unwrap();
        assert_eq!(
            state_to_status(&state).unwrap(),
            ActivationStatus::Received {
                code: "58123".into(),
                text: None
            }
        );

        let list = r#"[{"response":"TZ_NUM_ANSWER","msg":[{"service":"vk","msg":"111"},{"service":"vk","msg":"222"}]}]"#;
        let state = parse_state(list).unwrap();
        assert_eq!(
            state_to_status(&state).unwrap(),
            ActivationStatus::Received {
                code: "222".into(),
                text: None
            }
        );
    }

    #[test]
    fn test_state_terminal() {
        let expired = parse_state(r#"{"response":"ERROR_NO_OPERATIONS"}"#).unwrap();
        assert_eq!(state_to_status(&expired).unwrap(), ActivationStatus::Expired);

        let empty = parse_state("[]").unwrap();
        assert_eq!(state_to_status(&empty).unwrap(), ActivationStatus::Expired);

        let deleted = parse_state(r#"[{"response":"TZ_DELETED"}]"#).unwrap();
        assert_eq!(state_to_status(&deleted).unwrap(), ActivationStatus::Cancelled);
    }

    #[test]
    fn test_parse_ack() {
        assert!(parse_ack(r#"{"response":1,"tzid":1234567}"#).is_ok());
        assert!(parse_ack(r#"{"response":"ERROR_WRONG_TZID"}"#).is_err());
    }
}
