//! Purchase request and response DTOs
//!
//! Requests carry amounts as strings; handlers convert them with
//! [`crate::money::parse_amount`] at the configured precision.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::providers::ProviderKind;
use crate::purchase::validation::MAX_RENT_HOURS;
use crate::purchase::{PublicStatus, PurchaseRecord};

/// POST /api/v1/activations
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateActivationRequest {
    pub provider: ProviderKind,
    #[validate(length(min = 1, max = 32))]
    #[schema(example = "wa")]
    pub service: String,
    #[validate(length(min = 1, max = 32))]
    #[schema(example = "0")]
    pub country: String,
    /// Refuse the number when it costs more than this
    #[schema(example = "1.50")]
    pub max_price: Option<String>,
    /// Client idempotency key
    #[validate(length(min = 1, max = 64))]
    pub cid: Option<String>,
}

/// POST /api/v1/rentals
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRentalRequest {
    pub provider: ProviderKind,
    #[validate(length(min = 1, max = 32))]
    pub service: String,
    #[validate(length(min = 1, max = 32))]
    pub country: String,
    #[validate(range(min = 1, max = MAX_RENT_HOURS))]
    #[schema(example = 4)]
    pub hours: u32,
    pub max_price: Option<String>,
    #[validate(length(min = 1, max = 64))]
    pub cid: Option<String>,
}

/// `?limit=` of list endpoints
#[derive(Debug, Deserialize, Validate, IntoParams)]
pub struct ListQuery {
    #[validate(range(min = 1, max = 500))]
    pub limit: Option<i64>,
}

impl ListQuery {
    pub const DEFAULT_LIMIT: i64 = 50;

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT)
    }
}

/// POST /api/v1/admin/credit
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdminCreditRequest {
    pub user_id: Uuid,
    #[schema(example = "25.00")]
    pub amount: String,
    /// Idempotency reference of the credit
    #[validate(length(min = 1, max = 128))]
    pub reference: String,
    #[validate(length(max = 255))]
    pub description: Option<String>,
}

/// Purchase as shown to its owner
#[derive(Debug, Serialize, ToSchema)]
pub struct PurchaseView {
    #[schema(example = "01HZX3N4Q8W2V6M0K9T7R5Y1BC")]
    pub id: String,
    #[schema(example = "activation")]
    pub kind: &'static str,
    pub provider: ProviderKind,
    pub service: String,
    pub country: String,
    pub status: PublicStatus,
    /// Internal state name
    #[schema(example = "ACTIVE")]
    pub state: &'static str,
    #[schema(value_type = String, example = "0.65")]
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rent_hours: Option<i32>,
    pub phone: Option<String>,
    pub sms_code: Option<String>,
    pub sms_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<PurchaseRecord> for PurchaseView {
    fn from(r: PurchaseRecord) -> Self {
        Self {
            id: r.purchase_id.to_string(),
            kind: r.kind.as_str(),
            provider: r.provider,
            service: r.service,
            country: r.country,
            status: r.state.public_status(),
            state: r.state.as_str(),
            price: r.price,
            rent_hours: r.rent_hours,
            phone: r.phone,
            sms_code: r.sms_code,
            sms_text: r.sms_text,
            error_code: r.error_code,
            error_message: r.error_message,
            cid: r.cid,
            expires_at: r.expires_at,
            created_at: r.created_at,
        }
    }
}

/// Result of POST /api/v1/admin/credit
#[derive(Debug, Serialize, ToSchema)]
pub struct CreditResponse {
    pub user_id: Uuid,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[schema(value_type = String)]
    pub balance: Decimal,
    /// The reference had already been credited
    pub replayed: bool,
}

/// Result of a payment webhook
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// `credited`, `already_processed` or `ignored`
    #[schema(example = "credited")]
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub referral_bonus: Option<Decimal>,
}
