//! API Response types and error codes
//!
//! - `ApiResponse<T>`: Unified response wrapper
//! - `ApiError` / `ApiResult<T>`: handler error path, renders the same envelope
//! - `error_codes`: Standard error code constants

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::payments::PaymentError;
use crate::purchase::PurchaseError;
use crate::reconcile::ReconcileError;

// ============================================================================
// Unified API Response Format
// ============================================================================

/// Unified API response wrapper
///
/// All API responses follow this structure:
/// - code: 0 = success, non-zero = error code
/// - msg: short message description
/// - data: actual data (success) or null (error)
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    /// Response code: 0 for success, non-zero for errors
    #[schema(example = 0)]
    pub code: i32,
    /// Response message
    #[schema(example = "ok")]
    pub msg: String,
    /// Response data (only present when code == 0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Create success response
    pub fn success(data: T) -> Self {
        Self {
            code: error_codes::SUCCESS,
            msg: "ok".to_string(),
            data: Some(data),
        }
    }

    /// Create error response
    pub fn error(code: i32, msg: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            code,
            msg: msg.into(),
            data: None,
        }
    }
}

// ============================================================================
// Handler Results
// ============================================================================

pub type ApiResult<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

/// 200 OK with `data`
pub fn ok<T>(data: T) -> ApiResult<T> {
    Ok((StatusCode::OK, Json(ApiResponse::success(data))))
}

/// Error leg of [`ApiResult`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: i32,
    pub msg: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: i32, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            msg: msg.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error_codes::INVALID_PARAMETER, msg)
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error_codes::AUTH_FAILED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error_codes::FORBIDDEN, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error_codes::NOT_FOUND, msg)
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            error_codes::SERVICE_UNAVAILABLE,
            msg,
        )
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            error_codes::INTERNAL_ERROR,
            msg,
        )
    }

    /// Shorthand for `Err(self)` in handler bodies
    pub fn into_err<T>(self) -> ApiResult<T> {
        Err(self)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiResponse::<()>::error(self.code, self.msg)),
        )
            .into_response()
    }
}

impl From<PurchaseError> for ApiError {
    fn from(e: PurchaseError) -> Self {
        let code = match &e {
            PurchaseError::InvalidRequest(_)
            | PurchaseError::PriceTooLow { .. }
            | PurchaseError::PriceAboveLimit { .. }
            | PurchaseError::UnsupportedProvider(_) => error_codes::INVALID_PARAMETER,
            PurchaseError::InsufficientBalance => error_codes::INSUFFICIENT_BALANCE,
            PurchaseError::UserNotFound => error_codes::USER_NOT_FOUND,
            PurchaseError::Forbidden => error_codes::FORBIDDEN,
            PurchaseError::NotFound(_) => error_codes::NOT_FOUND,
            PurchaseError::InvalidState { .. } => error_codes::INVALID_STATE,
            PurchaseError::NoNumbers => error_codes::NO_NUMBERS,
            PurchaseError::ProviderRejected(_) => error_codes::PROVIDER_REJECTED,
            PurchaseError::ProviderUnavailable(_) => error_codes::SERVICE_UNAVAILABLE,
            PurchaseError::Ledger(_)
            | PurchaseError::DatabaseError(_)
            | PurchaseError::SystemError(_) => error_codes::INTERNAL_ERROR,
        };
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        // Internal details stay in the logs
        let msg = if status.is_server_error() && code == error_codes::INTERNAL_ERROR {
            tracing::error!(error = %e, code = e.code(), "Purchase request failed");
            "Internal error".to_string()
        } else {
            e.to_string()
        };
        Self::new(status, code, msg)
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        let code = match &e {
            PaymentError::NotConfigured(_) => error_codes::NOT_FOUND,
            PaymentError::InvalidPayload(_) | PaymentError::UnknownUser(_) => {
                error_codes::INVALID_PARAMETER
            }
            PaymentError::InvalidSignature | PaymentError::SignatureExpired => {
                error_codes::AUTH_FAILED
            }
            PaymentError::Unconfirmed(_) => error_codes::PAYMENT_UNCONFIRMED,
            PaymentError::Upstream(_) => error_codes::SERVICE_UNAVAILABLE,
            PaymentError::Ledger(_) => error_codes::INTERNAL_ERROR,
        };
        let status =
            StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, code, e.to_string())
    }
}

impl From<ReconcileError> for ApiError {
    fn from(e: ReconcileError) -> Self {
        tracing::error!(error = %e, code = e.code(), "Reconciliation request failed");
        Self::internal("Reconciliation failed")
    }
}

// ============================================================================
// Error Codes
// ============================================================================

/// Standard API error codes
pub mod error_codes {
    // Success
    pub const SUCCESS: i32 = 0;

    // Client errors (1xxx)
    pub const INVALID_PARAMETER: i32 = 1001;
    pub const INSUFFICIENT_BALANCE: i32 = 1002;
    pub const USER_NOT_FOUND: i32 = 1003;
    pub const PAYMENT_UNCONFIRMED: i32 = 1004;
    pub const REFERENCE_CONFLICT: i32 = 1005;

    // Auth errors (2xxx)
    pub const MISSING_AUTH: i32 = 2001;
    pub const AUTH_FAILED: i32 = 2002;
    pub const FORBIDDEN: i32 = 2003;

    // Purchase errors (3xxx)
    pub const NO_NUMBERS: i32 = 3001;
    pub const PROVIDER_REJECTED: i32 = 3002;
    pub const INVALID_STATE: i32 = 3003;

    // Resource errors (4xxx)
    pub const NOT_FOUND: i32 = 4001;

    // Server errors (5xxx)
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const SERVICE_UNAVAILABLE: i32 = 5001;
}
