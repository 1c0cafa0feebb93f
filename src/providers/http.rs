//! Shared HTTP plumbing for provider clients

use serde_json::Value;
use std::time::Duration;

use super::error::ProviderError;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e)))
}

/// A connect failure means the request never left; anything later is ambiguous.
pub(crate) fn transport(e: reqwest::Error) -> ProviderError {
    if e.is_connect() {
        ProviderError::Unreachable(e.to_string())
    } else {
        ProviderError::Transport(e.to_string())
    }
}

/// GET and return status plus body text
pub(crate) async fn get_text(
    request: reqwest::RequestBuilder,
) -> Result<(u16, String), ProviderError> {
    let response = request.send().await.map_err(transport)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(transport)?;
    Ok((status, body))
}

/// Providers send ids and codes as either JSON strings or numbers
pub(crate) fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Shorten a body for error messages
pub(crate) fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(120) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
