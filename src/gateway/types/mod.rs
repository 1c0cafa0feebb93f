//! Gateway types module
//!
//! ## Submodules
//! - [`purchase`]: Request DTOs (validated with `validator`) and purchase views
//! - [`response`]: Response envelope, handler errors and error codes

pub mod purchase;
pub mod response;

// Re-export commonly used types at module root
pub use purchase::{
    AdminCreditRequest, CreateActivationRequest, CreateRentalRequest, CreditResponse, ListQuery,
    PurchaseView, WebhookAck,
};
pub use response::{ApiError, ApiResponse, ApiResult, error_codes, ok};
