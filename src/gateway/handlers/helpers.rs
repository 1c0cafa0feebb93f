//! Helper functions for handlers

use rust_decimal::Decimal;
use validator::Validate;

use crate::money;
use crate::purchase::{PurchaseId, PurchaseKind, PurchaseRecord};

use super::super::types::ApiError;

/// Run `validator` rules, first failure becomes a 400
pub fn validate<T: Validate>(req: &T) -> Result<(), ApiError> {
    req.validate()
        .map_err(|e| ApiError::bad_request(format!("Invalid request: {}", e)))
}

pub fn parse_purchase_id(raw: &str) -> Result<PurchaseId, ApiError> {
    raw.parse::<PurchaseId>()
        .map_err(|_| ApiError::bad_request(format!("Invalid purchase id: {}", raw)))
}

/// Client amount string at the configured precision
pub fn parse_amount(raw: &str, decimals: u32) -> Result<Decimal, ApiError> {
    money::parse_amount(raw, decimals)
        .map_err(|e| ApiError::bad_request(format!("Invalid amount '{}': {}", raw, e)))
}

pub fn parse_optional_amount(
    raw: Option<&str>,
    decimals: u32,
) -> Result<Option<Decimal>, ApiError> {
    raw.map(|s| parse_amount(s, decimals)).transpose()
}

/// Activations and rentals share ids; each route only serves its own kind
pub fn expect_kind(record: PurchaseRecord, kind: PurchaseKind) -> Result<PurchaseRecord, ApiError> {
    if record.kind != kind {
        return Err(ApiError::not_found(format!(
            "{} {} not found",
            kind, record.purchase_id
        )));
    }
    Ok(record)
}
