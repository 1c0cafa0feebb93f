//! Payment Gateways
//!
//! Webhook notifications from MoneyFusion, PayDunya and Wave are verified
//! into a [`VerifiedPayment`] and credited through [`PaymentService`].
//! Crediting is idempotent by `(gateway, reference)`, so gateways may
//! redeliver a notification as often as they like.

pub mod error;
pub mod moneyfusion;
pub mod paydunya;
pub mod service;
pub mod wave;

pub use error::PaymentError;
pub use moneyfusion::{HttpStatusChecker, MoneyFusion, PaymentVerifier};
pub use paydunya::PayDunya;
pub use service::{AccountDirectory, PaymentOutcome, PaymentService};
pub use wave::Wave;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Gateway {
    MoneyFusion,
    PayDunya,
    Wave,
}

impl Gateway {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gateway::MoneyFusion => "moneyfusion",
            Gateway::PayDunya => "paydunya",
            Gateway::Wave => "wave",
        }
    }
}

impl fmt::Display for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gateway {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "moneyfusion" => Ok(Gateway::MoneyFusion),
            "paydunya" => Ok(Gateway::PayDunya),
            "wave" => Ok(Gateway::Wave),
            _ => Err(PaymentError::InvalidPayload(format!("unknown gateway {s}"))),
        }
    }
}

/// A notification whose origin has been checked
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    pub gateway: Gateway,
    /// Gateway-side payment id; the idempotency key of the credit
    pub reference: String,
    pub user_id: Uuid,
    pub amount: Decimal,
    /// Money actually arrived; anything else is acknowledged without a credit
    pub settled: bool,
}

/// Amounts arrive as JSON numbers or strings depending on the gateway
pub(crate) fn decimal_field(value: &Value, field: &str) -> Result<Decimal, PaymentError> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => {
            return Err(PaymentError::InvalidPayload(format!(
                "{field} is missing or not a number"
            )));
        }
    };
    Decimal::from_str(&raw)
        .map_err(|_| PaymentError::InvalidPayload(format!("{field} is not a number: {raw}")))
}

pub(crate) fn user_field(raw: &str) -> Result<Uuid, PaymentError> {
    Uuid::parse_str(raw.trim()).map_err(|_| PaymentError::UnknownUser(raw.to_string()))
}

/// Compare secrets without an early exit on the first differing byte
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
