//! Upstream SMS Providers
//!
//! One client per provider behind the [`SmsProvider`] trait. Each upstream
//! speaks its own mix of plaintext and JSON; the response parsers are pure
//! functions so they can be tested without the network.
//!
//! Every failure is classified (see [`ProviderError::is_explicit`]): an
//! explicit rejection means no number was issued and the hold can be
//! refunded, anything else leaves the purchase where it is.

pub mod error;
pub mod five_sim;
mod http;
pub mod onlinesim;
pub mod registry;
#[cfg(feature = "sandbox")]
pub mod sandbox;
pub mod sms_activate;
pub mod smspva;

pub use error::ProviderError;
pub use five_sim::FiveSimClient;
pub use onlinesim::OnlineSimClient;
pub use registry::ProviderRegistry;
#[cfg(feature = "sandbox")]
pub use sandbox::SandboxProvider;
pub use sms_activate::SmsActivateClient;
pub use smspva::SmspvaClient;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Upstream provider identifier, stored in `purchases.provider`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum ProviderKind {
    #[serde(rename = "sms_activate")]
    SmsActivate,
    #[serde(rename = "5sim")]
    FiveSim,
    #[serde(rename = "smspva")]
    Smspva,
    #[serde(rename = "onlinesim")]
    OnlineSim,
    #[serde(rename = "sandbox")]
    Sandbox,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::SmsActivate => "sms_activate",
            ProviderKind::FiveSim => "5sim",
            ProviderKind::Smspva => "smspva",
            ProviderKind::OnlineSim => "onlinesim",
            ProviderKind::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sms_activate" | "sms-activate" => Ok(ProviderKind::SmsActivate),
            "5sim" | "five_sim" => Ok(ProviderKind::FiveSim),
            "smspva" => Ok(ProviderKind::Smspva),
            "onlinesim" => Ok(ProviderKind::OnlineSim),
            "sandbox" => Ok(ProviderKind::Sandbox),
            other => Err(ProviderError::NotConfigured(other.to_string())),
        }
    }
}

/// A number issued by a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOrder {
    pub order_id: String,
    pub phone: String,
    /// What the provider charged us, when it says so
    pub cost: Option<Decimal>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Enough to address an existing order; some providers need more than the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRef {
    pub order_id: String,
    pub service: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationStatus {
    Waiting,
    Received { code: String, text: Option<String> },
    Cancelled,
    Expired,
}

/// One message in a rental inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct SmsMessage {
    pub from: Option<String>,
    pub text: String,
    pub code: Option<String>,
    pub received_at: Option<String>,
}

impl SmsMessage {
    pub fn new(from: Option<String>, text: String, received_at: Option<String>) -> Self {
        let code = extract_code(&text);
        Self {
            from,
            text,
            code,
            received_at,
        }
    }
}

/// Upstream SMS provider
///
/// Status and cancel calls are safe to repeat.
#[async_trait]
pub trait SmsProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Order a number for a single verification code
    async fn buy_activation(
        &self,
        service: &str,
        country: &str,
    ) -> Result<ProviderOrder, ProviderError>;

    async fn check_activation(&self, order: &OrderRef) -> Result<ActivationStatus, ProviderError>;

    async fn cancel_activation(&self, order: &OrderRef) -> Result<(), ProviderError>;

    /// Confirm the code was used; closes the order upstream
    async fn finish_activation(&self, order: &OrderRef) -> Result<(), ProviderError>;

    /// Lease a number for `hours`
    async fn rent_number(
        &self,
        _service: &str,
        _country: &str,
        _hours: u32,
    ) -> Result<ProviderOrder, ProviderError> {
        Err(ProviderError::Rejected(format!(
            "{} does not offer rentals",
            self.kind()
        )))
    }

    async fn rent_messages(&self, _order: &OrderRef) -> Result<Vec<SmsMessage>, ProviderError> {
        Err(ProviderError::Rejected(format!(
            "{} does not offer rentals",
            self.kind()
        )))
    }

    async fn cancel_rent(&self, _order: &OrderRef) -> Result<(), ProviderError> {
        Err(ProviderError::Rejected(format!(
            "{} does not offer rentals",
            self.kind()
        )))
    }
}

/// First run of 4 to 8 digits in a message, the usual shape of a code
pub fn extract_code(text: &str) -> Option<String> {
    text.split(|c: char| !c.is_ascii_digit())
        .find(|run| (4..=8).contains(&run.len()))
        .map(str::to_string)
}
