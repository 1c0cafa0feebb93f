//! PayDunya
//!
//! The IPN carries `data.hash`, the hex SHA-512 of the merchant master key.

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha512};

use super::error::PaymentError;
use super::{Gateway, VerifiedPayment, constant_time_eq, decimal_field, user_field};

#[derive(Debug, Deserialize)]
struct Ipn {
    data: IpnData,
}

#[derive(Debug, Deserialize)]
struct IpnData {
    hash: String,
    status: String,
    #[serde(default)]
    token: Option<String>,
    invoice: Invoice,
    #[serde(default)]
    custom_data: Value,
}

#[derive(Debug, Deserialize)]
struct Invoice {
    #[serde(default)]
    token: Option<String>,
    total_amount: Value,
}

pub struct PayDunya {
    expected_hash: String,
}

impl PayDunya {
    pub fn new(master_key: &str) -> Self {
        Self {
            expected_hash: master_key_hash(master_key),
        }
    }

    pub fn verify(&self, body: &[u8]) -> Result<VerifiedPayment, PaymentError> {
        let ipn: Ipn = serde_json::from_slice(body)?;
        let data = ipn.data;

        if !constant_time_eq(
            data.hash.trim().to_ascii_lowercase().as_bytes(),
            self.expected_hash.as_bytes(),
        ) {
            return Err(PaymentError::InvalidSignature);
        }

        let reference = data
            .token
            .or(data.invoice.token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PaymentError::InvalidPayload("invoice token missing".into()))?;
        let user = data
            .custom_data
            .get("user_id")
            .and_then(Value::as_str)
            .ok_or_else(|| PaymentError::InvalidPayload("custom_data.user_id missing".into()))?;

        Ok(VerifiedPayment {
            gateway: Gateway::PayDunya,
            reference,
            user_id: user_field(user)?,
            amount: decimal_field(&data.invoice.total_amount, "total_amount")?,
            settled: data.status == "completed",
        })
    }
}

pub fn master_key_hash(master_key: &str) -> String {
    hex::encode(Sha512::digest(master_key.as_bytes()))
}
