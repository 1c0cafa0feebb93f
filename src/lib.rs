//! SMS Ledger - Prepaid balance for virtual phone numbers
//!
//! Users top up a balance through payment gateways and spend it on
//! activation numbers (one SMS code) or rentals (a leased inbox) bought from
//! upstream providers.
//!
//! # Modules
//!
//! - [`money`] - String ↔ `Decimal` conversion at the API boundary
//! - [`balance`] - Enforced balance type (balance / frozen / available)
//! - [`ledger`] - Freeze / charge / refund / credit with an audit trail
//! - [`providers`] - Upstream SMS provider adapters
//! - [`purchase`] - Purchase FSM and its coordinator
//! - [`payments`] - Payment webhook verification and crediting
//! - [`reconcile`] - Phantom frozen detection and correction
//! - [`worker`] - Status polling, recovery and reconciliation loops
//! - [`gateway`] - HTTP API
//! - [`account`] - User accounts
//! - [`db`] - PostgreSQL pool and migrations
//! - [`config`] / [`logging`] - Runtime configuration and tracing setup

pub mod account;
pub mod balance;
pub mod config;
pub mod db;
pub mod gateway;
pub mod ledger;
pub mod logging;
pub mod money;
pub mod payments;
pub mod providers;
pub mod purchase;
pub mod reconcile;
pub mod worker;

// Convenient re-exports at crate root
pub use balance::Balance;
pub use ledger::{Ledger, LedgerError, PgLedger};
pub use purchase::{PurchaseCoordinator, PurchaseError, PurchaseState};
pub use reconcile::{ReconcileReport, Reconciler};
