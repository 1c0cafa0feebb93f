//! Money Conversion Module
//!
//! Balances are `rust_decimal::Decimal` everywhere (`NUMERIC(18,4)` in
//! Postgres). Client-facing amounts are strings; every conversion between the
//! two goes through this module so precision is checked in one place.
//!
//! ## Usage
//! ```rust
//! use sms_ledger::money::{format_amount, parse_amount};
//!
//! let amount = parse_amount("1.5", 2).unwrap();
//! assert_eq!(format_amount(amount, 2), "1.50");
//! ```

use rust_decimal::prelude::*;
use thiserror::Error;

/// Fractional digits stored by the ledger columns (`NUMERIC(18,4)`).
pub const STORAGE_DECIMALS: u32 = 4;

// ============================================================================
// Error Types
// ============================================================================

/// Money conversion errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("Precision overflow: provided {provided} decimals, max allowed {max}")]
    PrecisionOverflow { provided: u32, max: u32 },

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

// ============================================================================
// Parse: Client → Internal
// ============================================================================

/// Convert a client string amount to a validated `Decimal`.
///
/// # Errors
/// * `PrecisionOverflow` - more fractional digits than `decimals`
/// * `InvalidAmount` - zero or negative
/// * `InvalidFormat` - anything that is not `digits[.digits]`
pub fn parse_amount(amount_str: &str, decimals: u32) -> Result<Decimal, MoneyError> {
    let amount_str = amount_str.trim();
    if amount_str.is_empty() {
        return Err(MoneyError::InvalidFormat("empty string".into()));
    }

    if amount_str.starts_with('-') {
        return Err(MoneyError::InvalidAmount);
    }

    let (whole, frac) = match amount_str.split_once('.') {
        None => (amount_str, ""),
        Some((whole, frac)) => {
            if whole.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing leading zero (e.g., use 0.5 instead of .5)".into(),
                ));
            }
            if frac.is_empty() {
                return Err(MoneyError::InvalidFormat(
                    "missing fractional part (e.g., use 5.0 instead of 5.)".into(),
                ));
            }
            (whole, frac)
        }
    };

    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return Err(MoneyError::InvalidFormat(format!(
            "invalid character in amount: {amount_str}"
        )));
    }

    // Trailing zeros do not count against precision: "1.50" is valid at 1 decimal.
    let significant = frac.trim_end_matches('0').len() as u32;
    if significant > decimals {
        return Err(MoneyError::PrecisionOverflow {
            provided: significant,
            max: decimals,
        });
    }

    let value = Decimal::from_str(amount_str)
        .map_err(|e| MoneyError::InvalidFormat(format!("{amount_str}: {e}")))?;

    if value.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    Ok(value.normalize())
}

/// Validate a `Decimal` that was already deserialized from JSON.
pub fn parse_decimal(value: Decimal, decimals: u32) -> Result<Decimal, MoneyError> {
    if value.is_sign_negative() || value.is_zero() {
        return Err(MoneyError::InvalidAmount);
    }

    let normalized = value.normalize();
    if normalized.scale() > decimals {
        return Err(MoneyError::PrecisionOverflow {
            provided: normalized.scale(),
            max: decimals,
        });
    }

    Ok(normalized)
}

// ============================================================================
// Format: Internal → Client
// ============================================================================

/// Render an amount with exactly `decimals` fractional digits.
pub fn format_amount(value: Decimal, decimals: u32) -> String {
    let rounded = value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.prec$}", rounded, prec = decimals as usize)
}

// ============================================================================
// Pricing
// ============================================================================

/// Resale price for a provider cost: `cost * (1 + percent / 100)`, rounded up
/// to the currency precision so the platform never sells below cost.
pub fn apply_markup(cost: Decimal, percent: Decimal, decimals: u32) -> Decimal {
    let factor = Decimal::ONE + percent / Decimal::ONE_HUNDRED;
    (cost * factor).round_dp_with_strategy(decimals, RoundingStrategy::AwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount_basic() {
        assert_eq!(parse_amount("1.5", 2).unwrap(), d("1.5"));
        assert_eq!(parse_amount("100", 2).unwrap(), d("100"));
        assert_eq!(parse_amount(" 0.25 ", 2).unwrap(), d("0.25"));
    }

    #[test]
    fn test_parse_amount_trailing_zeros_allowed() {
        assert_eq!(parse_amount("1.500", 1).unwrap(), d("1.5"));
    }

    #[test]
    fn test_parse_amount_precision_overflow() {
        let err = parse_amount("1.234", 2).unwrap_err();
        assert_eq!(
            err,
            MoneyError::PrecisionOverflow {
                provided: 3,
                max: 2
            }
        );
    }

    #[test]
    fn test_parse_amount_rejects_zero_and_negative() {
        assert_eq!(parse_amount("0", 2).unwrap_err(), MoneyError::InvalidAmount);
        assert_eq!(parse_amount("0.00", 2).unwrap_err(), MoneyError::InvalidAmount);
        assert_eq!(parse_amount("-1", 2).unwrap_err(), MoneyError::InvalidAmount);
    }

    #[test]
    fn test_parse_amount_rejects_malformed() {
        for bad in ["", ".5", "5.", "1.2.3", "1e5", "+1", "abc", "1,5"] {
            assert!(
                matches!(parse_amount(bad, 2), Err(MoneyError::InvalidFormat(_))),
                "expected InvalidFormat for {bad:?}"
            );
        }
    }

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal(d("2.10"), 1).unwrap(), d("2.1"));
        assert!(parse_decimal(d("-2"), 2).is_err());
        assert!(parse_decimal(Decimal::ZERO, 2).is_err());
        assert!(parse_decimal(d("0.001"), 2).is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(d("1.5"), 2), "1.50");
        assert_eq!(format_amount(d("0.125"), 2), "0.13");
        assert_eq!(format_amount(d("42"), 0), "42");
    }

    #[test]
    fn test_apply_markup_rounds_up() {
        assert_eq!(apply_markup(d("10"), d("30"), 2), d("13.00"));
        assert_eq!(apply_markup(d("0.333"), Decimal::ZERO, 2), d("0.34"));
        assert_eq!(apply_markup(d("0.10"), d("25"), 2), d("0.13"));
    }
}
