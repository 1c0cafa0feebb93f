use std::sync::Arc;

use crate::db::Database;
use crate::ledger::Ledger;
use crate::payments::PaymentService;
use crate::purchase::PurchaseCoordinator;
use crate::reconcile::Reconciler;

use super::auth::TokenVerifier;

/// Gateway application state (shared)
#[derive(Clone)]
pub struct AppState {
    /// Purchase FSM driver
    pub coordinator: Arc<PurchaseCoordinator>,
    /// Balance ledger
    pub ledger: Arc<dyn Ledger>,
    /// Payment webhook verification and crediting
    pub payments: Arc<PaymentService>,
    /// Bearer token verification
    pub tokens: Arc<TokenVerifier>,
    /// Client-facing amount precision
    pub decimals: u32,
    /// PostgreSQL (health, transaction history); `None` for in-memory wiring
    pub pg_db: Option<Database>,
    /// Phantom frozen reconciliation; needs `pg_db`
    pub reconciler: Option<Arc<Reconciler>>,
}

impl AppState {
    pub fn new(
        coordinator: Arc<PurchaseCoordinator>,
        ledger: Arc<dyn Ledger>,
        payments: Arc<PaymentService>,
        tokens: Arc<TokenVerifier>,
        decimals: u32,
    ) -> Self {
        Self {
            coordinator,
            ledger,
            payments,
            tokens,
            decimals,
            pg_db: None,
            reconciler: None,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.reconciler = Some(Arc::new(Reconciler::new(db.pool().clone())));
        self.pg_db = Some(db);
        self
    }
}
