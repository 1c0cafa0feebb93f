//! User accounts
//!
//! Users are provisioned by the auth service; this crate reads their role and
//! referral link and owns the balance columns through the ledger.

pub mod models;
pub mod repository;

pub use models::{User, UserRole};
pub use repository::UserRepository;
