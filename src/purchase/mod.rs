//! Purchase FSM
//!
//! Activations (one SMS code) and rentals (a leased inbox) share one
//! persistent state machine in the `purchases` table.
//!
//! # State Machine
//!
//! ```text
//! PENDING → FROZEN → ORDERING → ACTIVE → RECEIVED (charged)
//!    ↓                   ↓         ↓
//!  FAILED          REFUNDING ← ────┘
//!                        ↓
//!        FAILED | TIMEOUT | CANCELLED (hold released)
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Persist-Before-Call**: ORDERING is stored before the provider is called
//! 2. **Explicit Fail Rule**: only an explicit provider refusal releases a hold
//!    on the spot; an unknown outcome waits for the stale threshold
//! 3. **Idempotency**: ledger operations are keyed by purchase id, creation by `cid`
//! 4. **One Settlement**: a hold is either charged or refunded, never both

pub mod coordinator;
pub mod db;
pub mod error;
#[cfg(test)]
pub mod memory;
pub mod pricing;
pub mod state;
pub mod types;
pub mod validation;


pub use coordinator::{CoordinatorSettings, PurchaseCoordinator};
pub use db::{PurchaseDb, PurchaseStore};
pub use error::PurchaseError;
pub use pricing::PriceBook;
pub use state::{CloseReason, PublicStatus, PurchaseState};
pub use types::{OrderDetails, PurchaseId, PurchaseKind, PurchaseRecord, PurchaseRequest};
