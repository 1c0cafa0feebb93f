//! Input validation for purchase requests
//!
//! Validated newtypes for provider service and country codes. Fields are
//! private so every value went through `new()`.

use std::fmt;

/// Longest lease accepted (30 days)
pub const MAX_RENT_HOURS: u32 = 720;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("Rental length must be 1-{max} hours, got {got}")]
    RentHoursOutOfRange { got: u32, max: u32 },
}

fn check_code(field: &'static str, raw: &str) -> Result<String, ValidationError> {
    let code = raw.trim().to_ascii_lowercase();

    if code.is_empty() || code.len() > 32 {
        return Err(ValidationError::InvalidLength {
            field,
            min: 1,
            max: 32,
            actual: code.len(),
        });
    }

    if !code
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ValidationError::InvalidFormat {
            field,
            value: code,
            expected: "letters, numbers, underscore, hyphen",
        });
    }

    Ok(code)
}

// ============================================================================
// ServiceCode
// ============================================================================

/// Provider service code (`wa`, `tg`, `google`, ...), lowercased
///
/// ```
/// use sms_ledger::purchase::validation::ServiceCode;
///
/// let wa = ServiceCode::new(" WA ").unwrap();
/// assert_eq!(wa.as_str(), "wa");
/// assert!(ServiceCode::new("wa&country=1").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceCode(String);

impl ServiceCode {
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        check_code("service", code).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ServiceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CountryCode
// ============================================================================

/// Provider country identifier; numeric ids and names both occur upstream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CountryCode(String);

impl CountryCode {
    pub fn new(code: &str) -> Result<Self, ValidationError> {
        check_code("country", code).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// RentHours
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentHours(u32);

impl RentHours {
    pub fn new(hours: u32) -> Result<Self, ValidationError> {
        if hours == 0 || hours > MAX_RENT_HOURS {
            return Err(ValidationError::RentHoursOutOfRange {
                got: hours,
                max: MAX_RENT_HOURS,
            });
        }
        Ok(Self(hours))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_code_valid() {
        assert_eq!(ServiceCode::new("wa").unwrap().as_str(), "wa");
        assert_eq!(ServiceCode::new("Telegram").unwrap().as_str(), "telegram");
        assert!(ServiceCode::new("opt_4").is_ok());
        assert!(ServiceCode::new("any-other").is_ok());
    }

    #[test]
    fn test_service_code_invalid() {
        assert!(matches!(
            ServiceCode::new("  ").unwrap_err(),
            ValidationError::InvalidLength { .. }
        ));
        assert!(matches!(
            ServiceCode::new(&"x".repeat(33)).unwrap_err(),
            ValidationError::InvalidLength { .. }
        ));
        assert!(matches!(
            ServiceCode::new("wa/../x").unwrap_err(),
            ValidationError::InvalidFormat { .. }
        ));
    }

    #[test]
    fn test_country_code() {
        assert_eq!(CountryCode::new("0").unwrap().as_str(), "0");
        assert_eq!(CountryCode::new("Russia").unwrap().to_string(), "russia");
        assert!(CountryCode::new("ru us").is_err());
    }

    #[test]
    fn test_rent_hours_range() {
        assert_eq!(RentHours::new(4).unwrap().get(), 4);
        assert!(RentHours::new(MAX_RENT_HOURS).is_ok());
        assert_eq!(
            RentHours::new(0).unwrap_err(),
            ValidationError::RentHoursOutOfRange {
                got: 0,
                max: MAX_RENT_HOURS
            }
        );
        assert!(RentHours::new(MAX_RENT_HOURS + 1).is_err());
    }
}
