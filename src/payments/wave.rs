//! Wave
//!
//! `Wave-Signature: t=<unix ts>,v1=<hex hmac-sha256(secret, ts + body)>`.
//! Several `v1` entries may be present while a secret is being rotated.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use super::error::PaymentError;
use super::{Gateway, VerifiedPayment, decimal_field, user_field};
use crate::config::WaveSettings;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Wave-Signature";
pub const COMPLETED_EVENT: &str = "checkout.session.completed";

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    data: Session,
}

#[derive(Debug, Deserialize)]
struct Session {
    id: String,
    amount: Value,
    #[serde(default)]
    client_reference: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
}

pub struct Wave {
    secret: String,
    tolerance_secs: i64,
}

impl Wave {
    pub fn new(settings: &WaveSettings) -> Self {
        Self {
            secret: settings.webhook_secret.clone(),
            tolerance_secs: settings.tolerance_secs,
        }
    }

    pub fn verify(&self, signature: &str, body: &[u8]) -> Result<VerifiedPayment, PaymentError> {
        self.verify_at(signature, body, Utc::now().timestamp())
    }

    pub fn verify_at(
        &self,
        signature: &str,
        body: &[u8],
        now: i64,
    ) -> Result<VerifiedPayment, PaymentError> {
        self.check_signature(signature, body, now)?;

        let event: Event = serde_json::from_slice(body)?;
        let session = event.data;
        let user = session
            .client_reference
            .as_deref()
            .ok_or_else(|| PaymentError::InvalidPayload("client_reference missing".into()))?;

        Ok(VerifiedPayment {
            gateway: Gateway::Wave,
            reference: session.id,
            user_id: user_field(user)?,
            amount: decimal_field(&session.amount, "amount")?,
            settled: event.kind == COMPLETED_EVENT
                && session.payment_status.as_deref() == Some("succeeded"),
        })
    }

    fn check_signature(&self, header: &str, body: &[u8], now: i64) -> Result<(), PaymentError> {
        let mut timestamp: Option<&str> = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", v)) => timestamp = Some(v),
                Some(("v1", v)) => candidates.push(v),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(PaymentError::InvalidSignature)?;
        let ts: i64 = timestamp
            .parse()
            .map_err(|_| PaymentError::InvalidSignature)?;
        if (now - ts).abs() > self.tolerance_secs {
            return Err(PaymentError::SignatureExpired);
        }

        for candidate in candidates {
            let Ok(expected) = hex::decode(candidate) else {
                continue;
            };
            let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
                .map_err(|_| PaymentError::InvalidSignature)?;
            mac.update(timestamp.as_bytes());
            mac.update(body);
            if mac.verify_slice(&expected).is_ok() {
                return Ok(());
            }
        }
        Err(PaymentError::InvalidSignature)
    }
}
