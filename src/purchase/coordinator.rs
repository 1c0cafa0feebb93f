//! Purchase Coordinator
//!
//! Drives the purchase FSM: every transition is persisted (CAS) before the
//! ledger or the provider is called, and only an explicit provider refusal
//! releases a hold on the spot.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::db::PurchaseStore;
use super::error::PurchaseError;
use super::pricing::PriceBook;
use super::state::{CloseReason, PurchaseState};
use super::types::{OrderDetails, PurchaseId, PurchaseKind, PurchaseRecord, PurchaseRequest};
use super::validation::{CountryCode, RentHours, ServiceCode};
use crate::config::WorkersConfig;
use crate::ledger::{Ledger, LedgerError, RefundOutcome};
use crate::providers::{
    ActivationStatus, OrderRef, ProviderError, ProviderOrder, ProviderRegistry, SmsMessage,
    SmsProvider,
};

/// Step limit of `execute`
const MAX_STEPS: usize = 20;
const STEP_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Timing knobs of the FSM
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    /// ORDERING longer than this is refunded
    pub stale_threshold: Duration,
    /// Activation lifetime when the provider does not report one
    pub activation_ttl: Duration,
    /// How long past `expires_at` an unreachable provider is tolerated
    pub expiry_grace: Duration,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&WorkersConfig::default())
    }
}

impl CoordinatorSettings {
    pub fn from_config(workers: &WorkersConfig) -> Self {
        Self {
            stale_threshold: workers.stale_threshold(),
            activation_ttl: workers.activation_ttl(),
            expiry_grace: Duration::from_secs(300),
        }
    }
}

/// Purchase Coordinator - orchestrates FSM-based processing
pub struct PurchaseCoordinator {
    store: Arc<dyn PurchaseStore>,
    ledger: Arc<dyn Ledger>,
    providers: ProviderRegistry,
    prices: PriceBook,
    settings: CoordinatorSettings,
}

impl PurchaseCoordinator {
    pub fn new(
        store: Arc<dyn PurchaseStore>,
        ledger: Arc<dyn Ledger>,
        providers: ProviderRegistry,
        prices: PriceBook,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            providers,
            prices,
            settings,
        }
    }

    /// Validate, price and record a new purchase in PENDING
    ///
    /// Idempotent by `(user_id, cid)`: a repeated cid returns the stored record.
    pub async fn create(&self, req: PurchaseRequest) -> Result<PurchaseRecord, PurchaseError> {
        if let Some(cid) = &req.cid
            && let Some(existing) = self.store.get_by_cid(req.user_id, cid).await?
        {
            debug!(cid = %cid, purchase_id = %existing.purchase_id, "Duplicate cid found");
            return Ok(existing);
        }

        let service = ServiceCode::new(&req.service)?;
        let country = CountryCode::new(&req.country)?;
        let rent_hours = match req.kind {
            PurchaseKind::Activation => None,
            PurchaseKind::Rental => {
                let hours = req.rent_hours.ok_or_else(|| {
                    PurchaseError::InvalidRequest("rentals need a number of hours".into())
                })?;
                Some(RentHours::new(hours)?.get())
            }
        };

        if !self.providers.contains(req.provider) {
            return Err(PurchaseError::UnsupportedProvider(req.provider.to_string()));
        }

        let price = match rent_hours {
            Some(hours) => self.prices.rental_price(service.as_str(), hours)?,
            None => self.prices.activation_price(service.as_str())?,
        };
        PriceBook::check_limit(price, req.max_price)?;

        // Early answer; the freeze re-checks under the row lock
        let balance = self.ledger.snapshot(req.user_id).await?;
        if balance.available < price {
            return Err(PurchaseError::InsufficientBalance);
        }

        let record = PurchaseRecord::new(
            req.user_id,
            req.kind,
            req.provider,
            service.into_string(),
            country.into_string(),
            rent_hours,
            price,
            req.cid,
        );
        let stored = self.store.create(&record).await?;

        info!(
            purchase_id = %stored.purchase_id,
            user_id = %stored.user_id,
            kind = %stored.kind,
            provider = %stored.provider,
            price = %stored.price,
            "Purchase created"
        );
        Ok(stored)
    }

    /// Create and drive to ACTIVE; a FAILED purchase becomes its error
    pub async fn purchase(&self, req: PurchaseRequest) -> Result<PurchaseRecord, PurchaseError> {
        let created = self.create(req).await?;
        self.execute(created.purchase_id).await?;
        let record = self.load(created.purchase_id).await?;

        if record.state == PurchaseState::Failed {
            return Err(PurchaseError::from_failure(
                record.error_code.as_deref(),
                record.error_message.as_deref(),
            ));
        }
        Ok(record)
    }

    /// Execute one step of the FSM and return the resulting state
    pub async fn step(&self, id: PurchaseId) -> Result<PurchaseState, PurchaseError> {
        let record = self.load(id).await?;

        if record.state.is_terminal() {
            return Ok(record.state);
        }

        let new_state = match record.state {
            PurchaseState::Pending => self.step_pending(&record).await?,
            PurchaseState::Frozen => self.step_frozen(&record).await?,
            PurchaseState::Ordering => self.step_ordering(&record).await?,
            PurchaseState::Active => self.step_active(&record).await?,
            PurchaseState::Refunding => self.step_refunding(&record).await?,
            _ => record.state,
        };

        // ACTIVE waits by design; only count stalls elsewhere
        if new_state == record.state && record.state != PurchaseState::Active {
            self.store.increment_retry(id).await?;
        }

        Ok(new_state)
    }

    /// Step until ACTIVE or terminal
    ///
    /// Stops early on an ORDERING stall; the recovery worker owns that case.
    pub async fn execute(&self, id: PurchaseId) -> Result<PurchaseState, PurchaseError> {
        let mut state = PurchaseState::Pending;

        for i in 0..MAX_STEPS {
            let previous = state;
            state = self.step(id).await?;

            if state.is_terminal() || state == PurchaseState::Active {
                debug!(purchase_id = %id, state = %state, steps = i + 1, "Purchase settled");
                return Ok(state);
            }
            if state == PurchaseState::Ordering && previous == PurchaseState::Ordering {
                debug!(purchase_id = %id, "Order outcome pending; left to recovery");
                return Ok(state);
            }
            if state == previous {
                tokio::time::sleep(STEP_RETRY_DELAY).await;
            }
        }

        warn!(purchase_id = %id, state = %state, "Purchase did not settle within step limit");
        Ok(state)
    }

    /// Check an ACTIVE purchase with its provider and return the fresh record
    pub async fn poll(&self, id: PurchaseId) -> Result<PurchaseRecord, PurchaseError> {
        let record = self.load(id).await?;
        if record.state == PurchaseState::Active
            && self.step(id).await? == PurchaseState::Refunding
        {
            self.execute(id).await?;
        }
        self.load(id).await
    }

    /// User cancellation of an ACTIVE purchase
    pub async fn cancel(&self, id: PurchaseId, user_id: Uuid) -> Result<PurchaseRecord, PurchaseError> {
        let record = self.get_for_user(id, user_id).await?;

        match record.state {
            PurchaseState::Cancelled => return Ok(record),
            PurchaseState::Active => {}
            other => {
                return Err(PurchaseError::InvalidState {
                    id: id.to_string(),
                    state: other.to_string(),
                });
            }
        }

        let order = self.order_of(&record)?;
        let provider = self.providers.get(record.provider)?;
        if let Err(e) = cancel_order(provider.as_ref(), record.kind, &order).await {
            warn!(purchase_id = %id, error = %e, "Provider refused cancellation");
            return Err(e.into());
        }

        if self
            .store
            .begin_refund(id, PurchaseState::Active, CloseReason::Cancelled, None)
            .await?
        {
            info!(purchase_id = %id, user_id = %user_id, "Purchase cancelled by user");
            self.execute(id).await?;
        }
        self.load(id).await
    }

    /// Force-release the hold of any non-terminal purchase
    pub async fn admin_refund(&self, id: PurchaseId) -> Result<PurchaseRecord, PurchaseError> {
        let record = self.load(id).await?;
        if record.state.is_terminal() {
            return Err(PurchaseError::InvalidState {
                id: id.to_string(),
                state: record.state.to_string(),
            });
        }

        if record.state == PurchaseState::Active
            && let Some(order) = record.order_ref()
            && let Ok(provider) = self.providers.get(record.provider)
            && let Err(e) = cancel_order(provider.as_ref(), record.kind, &order).await
        {
            warn!(purchase_id = %id, error = %e, "Provider cancel failed during admin refund");
        }

        if record.state != PurchaseState::Refunding
            && !self
                .store
                .begin_refund(id, record.state, CloseReason::Admin, None)
                .await?
        {
            let current = self.load(id).await?;
            return Err(PurchaseError::InvalidState {
                id: id.to_string(),
                state: current.state.to_string(),
            });
        }

        warn!(purchase_id = %id, previous_state = %record.state, "Admin refund");
        self.execute(id).await?;
        self.load(id).await
    }

    /// Messages received by a purchase
    ///
    /// Live inbox while a rental lease runs, the stored SMS otherwise.
    pub async fn messages(
        &self,
        id: PurchaseId,
        user_id: Uuid,
    ) -> Result<Vec<SmsMessage>, PurchaseError> {
        let record = self.get_for_user(id, user_id).await?;
        let live = record.kind == PurchaseKind::Rental
            && matches!(
                record.state,
                PurchaseState::Active | PurchaseState::Received
            )
            && !record.is_expired(Utc::now());

        if live && let Some(order) = record.order_ref() {
            let provider = self.providers.get(record.provider)?;
            return Ok(provider.rent_messages(&order).await?);
        }

        Ok(record
            .sms_text
            .clone()
            .or_else(|| record.sms_code.clone())
            .map(|text| {
                let mut message = SmsMessage::new(None, text, None);
                if record.sms_code.is_some() {
                    message.code = record.sms_code.clone();
                }
                vec![message]
            })
            .unwrap_or_default())
    }

    pub async fn get(&self, id: PurchaseId) -> Result<Option<PurchaseRecord>, PurchaseError> {
        self.store.get(id).await
    }

    /// Load a purchase owned by `user_id`
    pub async fn get_for_user(
        &self,
        id: PurchaseId,
        user_id: Uuid,
    ) -> Result<PurchaseRecord, PurchaseError> {
        let record = self.load(id).await?;
        if record.user_id != user_id {
            return Err(PurchaseError::Forbidden);
        }
        Ok(record)
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        kind: Option<PurchaseKind>,
        limit: i64,
    ) -> Result<Vec<PurchaseRecord>, PurchaseError> {
        self.store.list_for_user(user_id, kind, limit).await
    }

    /// Access to the store for the workers
    pub fn store(&self) -> &Arc<dyn PurchaseStore> {
        &self.store
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    // ------------------------------------------------------------------------
    // Steps
    // ------------------------------------------------------------------------

    /// PENDING: put the price on hold
    async fn step_pending(&self, record: &PurchaseRecord) -> Result<PurchaseState, PurchaseError> {
        let id = record.purchase_id;

        match self.ledger.freeze(&record.hold()).await {
            Ok(receipt) => {
                debug!(
                    purchase_id = %id,
                    replayed = receipt.replayed,
                    frozen = %receipt.after.frozen,
                    "Hold placed"
                );
                self.advance(id, PurchaseState::Pending, PurchaseState::Frozen)
                    .await
            }
            Err(e) if e.is_transient() => {
                warn!(purchase_id = %id, error = %e, "Freeze failed (will retry)");
                Ok(PurchaseState::Pending)
            }
            Err(e) => {
                let err = PurchaseError::from(e);
                info!(purchase_id = %id, error = %err, "Purchase rejected by ledger");
                if self
                    .store
                    .update_state_with_error(
                        id,
                        PurchaseState::Pending,
                        PurchaseState::Failed,
                        err.code(),
                        &err.to_string(),
                    )
                    .await?
                {
                    Ok(PurchaseState::Failed)
                } else {
                    self.current_state(id).await
                }
            }
        }
    }

    /// FROZEN: order the number (persist ORDERING first)
    async fn step_frozen(&self, record: &PurchaseRecord) -> Result<PurchaseState, PurchaseError> {
        let id = record.purchase_id;

        let provider = match self.providers.get(record.provider) {
            Ok(p) => p,
            Err(e) => {
                error!(purchase_id = %id, error = %e, "Provider disappeared after freeze");
                return self
                    .refund_from(id, PurchaseState::Frozen, CloseReason::ProviderFailure, Some(&e))
                    .await;
            }
        };

        if !self
            .store
            .update_state_if(id, PurchaseState::Frozen, PurchaseState::Ordering)
            .await?
        {
            return self.current_state(id).await;
        }

        let result = match record.kind {
            PurchaseKind::Activation => {
                provider
                    .buy_activation(&record.service, &record.country)
                    .await
            }
            PurchaseKind::Rental => {
                let hours = record.rent_hours.unwrap_or(1).max(1) as u32;
                provider
                    .rent_number(&record.service, &record.country, hours)
                    .await
            }
        };

        match result {
            Ok(order) => self.attach(record, order).await,
            Err(e) if e.is_explicit() => {
                info!(purchase_id = %id, error = %e, "Provider refused order");
                self.refund_from(id, PurchaseState::Ordering, CloseReason::ProviderFailure, Some(&e))
                    .await
            }
            Err(e) => {
                // A number may have been issued; never refund blind
                warn!(purchase_id = %id, error = %e, "Order outcome unknown");
                Ok(PurchaseState::Ordering)
            }
        }
    }

    /// ORDERING on re-entry: the outcome of the first call is unknown.
    /// Buying again could issue a second number, so wait out the stale
    /// threshold and then release the hold.
    async fn step_ordering(&self, record: &PurchaseRecord) -> Result<PurchaseState, PurchaseError> {
        let age = Utc::now()
            .signed_duration_since(record.updated_at)
            .to_std()
            .unwrap_or_default();

        if age < self.settings.stale_threshold {
            return Ok(PurchaseState::Ordering);
        }

        warn!(
            purchase_id = %record.purchase_id,
            age_secs = age.as_secs(),
            "Order never confirmed; releasing hold"
        );
        self.refund_from(record.purchase_id, PurchaseState::Ordering, CloseReason::Stale, None)
            .await
    }

    /// ACTIVE: ask the provider whether the SMS arrived
    async fn step_active(&self, record: &PurchaseRecord) -> Result<PurchaseState, PurchaseError> {
        let id = record.purchase_id;
        let order = self.order_of(record)?;
        let now = Utc::now();

        let provider = match self.providers.get(record.provider) {
            Ok(p) => p,
            Err(e) => return self.status_unknown(record, now, &e).await,
        };

        match record.kind {
            PurchaseKind::Activation => match provider.check_activation(&order).await {
                Ok(ActivationStatus::Received { code, text }) => {
                    self.deliver(record, provider.as_ref(), Some(&code), text.as_deref())
                        .await
                }
                Ok(ActivationStatus::Waiting) if record.is_expired(now) => {
                    self.expire(record, provider.as_ref(), &order).await
                }
                Ok(ActivationStatus::Waiting) => Ok(PurchaseState::Active),
                Ok(status @ (ActivationStatus::Cancelled | ActivationStatus::Expired)) => {
                    info!(purchase_id = %id, status = ?status, "Provider closed the order");
                    self.refund_from(id, PurchaseState::Active, CloseReason::Timeout, None)
                        .await
                }
                Err(e) => self.status_unknown(record, now, &e).await,
            },
            PurchaseKind::Rental => match provider.rent_messages(&order).await {
                Ok(messages) if !messages.is_empty() => {
                    let first = &messages[0];
                    self.deliver(
                        record,
                        provider.as_ref(),
                        first.code.as_deref(),
                        Some(first.text.as_str()),
                    )
                    .await
                }
                Ok(_) if record.is_expired(now) => {
                    self.expire(record, provider.as_ref(), &order).await
                }
                Ok(_) => Ok(PurchaseState::Active),
                Err(e) => self.status_unknown(record, now, &e).await,
            },
        }
    }

    /// REFUNDING: release the hold, then close with the recorded reason
    async fn step_refunding(&self, record: &PurchaseRecord) -> Result<PurchaseState, PurchaseError> {
        let id = record.purchase_id;
        let reason = record.close_reason.unwrap_or(CloseReason::Timeout);
        let outcome = match reason {
            CloseReason::ProviderFailure => RefundOutcome::Failed,
            _ => RefundOutcome::Refunded,
        };

        match self.ledger.refund(&id.to_string(), outcome).await {
            Ok(_) | Err(LedgerError::HoldNotFound(_)) => {
                let final_state = reason.final_state();
                if self
                    .store
                    .update_state_if(id, PurchaseState::Refunding, final_state)
                    .await?
                {
                    info!(purchase_id = %id, reason = %reason, state = %final_state, "Hold released");
                    Ok(final_state)
                } else {
                    self.current_state(id).await
                }
            }
            Err(LedgerError::AlreadySettled { settled_by, .. }) => {
                // The SMS was charged before the refund got here
                error!(
                    purchase_id = %id,
                    settled_by = settled_by,
                    "Refund found the hold already charged; closing as received"
                );
                self.advance(id, PurchaseState::Refunding, PurchaseState::Received)
                    .await
            }
            Err(e) => {
                warn!(purchase_id = %id, error = %e, "Refund failed (will retry)");
                Ok(PurchaseState::Refunding)
            }
        }
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// ORDERING → ACTIVE with the issued number
    async fn attach(
        &self,
        record: &PurchaseRecord,
        order: ProviderOrder,
    ) -> Result<PurchaseState, PurchaseError> {
        let id = record.purchase_id;
        let lifetime = match record.kind {
            PurchaseKind::Activation => self.settings.activation_ttl,
            PurchaseKind::Rental => {
                Duration::from_secs(record.rent_hours.unwrap_or(1).max(1) as u64 * 3600)
            }
        };
        let expires_at = order
            .expires_at
            .unwrap_or_else(|| Utc::now() + chrono::Duration::from_std(lifetime).unwrap_or_default());

        let details = OrderDetails {
            order_id: order.order_id,
            phone: order.phone,
            cost: order.cost,
            expires_at,
        };

        if self.store.attach_order(id, &details).await? {
            info!(
                purchase_id = %id,
                order_id = %details.order_id,
                phone = %details.phone,
                expires_at = %details.expires_at,
                "Number issued"
            );
            Ok(PurchaseState::Active)
        } else {
            self.current_state(id).await
        }
    }

    /// SMS arrived: store it, charge the hold, close as RECEIVED
    async fn deliver(
        &self,
        record: &PurchaseRecord,
        provider: &dyn SmsProvider,
        code: Option<&str>,
        text: Option<&str>,
    ) -> Result<PurchaseState, PurchaseError> {
        let id = record.purchase_id;
        self.store.record_sms(id, code, text).await?;

        match self.ledger.charge(&id.to_string()).await {
            Ok(receipt) => {
                debug!(purchase_id = %id, replayed = receipt.replayed, "Hold charged");
            }
            Err(LedgerError::AlreadySettled { settled_by, .. }) => {
                warn!(
                    purchase_id = %id,
                    settled_by = settled_by,
                    "SMS arrived after the hold was released"
                );
                return self.current_state(id).await;
            }
            Err(e) => return Err(e.into()),
        }

        if !self
            .store
            .update_state_if(id, PurchaseState::Active, PurchaseState::Received)
            .await?
        {
            return self.current_state(id).await;
        }

        if record.kind == PurchaseKind::Activation
            && let Some(order) = record.order_ref()
            && let Err(e) = provider.finish_activation(&order).await
        {
            warn!(purchase_id = %id, error = %e, "Finish activation failed (SMS already charged)");
        }

        info!(purchase_id = %id, user_id = %record.user_id, price = %record.price, "SMS received");
        Ok(PurchaseState::Received)
    }

    /// Local expiry passed with no SMS: close upstream and refund
    async fn expire(
        &self,
        record: &PurchaseRecord,
        provider: &dyn SmsProvider,
        order: &OrderRef,
    ) -> Result<PurchaseState, PurchaseError> {
        if let Err(e) = cancel_order(provider, record.kind, order).await {
            warn!(purchase_id = %record.purchase_id, error = %e, "Provider cancel on expiry failed");
        }
        self.refund_from(record.purchase_id, PurchaseState::Active, CloseReason::Timeout, None)
            .await
    }

    /// Provider could not answer: keep waiting until the grace period is over
    async fn status_unknown(
        &self,
        record: &PurchaseRecord,
        now: DateTime<Utc>,
        err: &ProviderError,
    ) -> Result<PurchaseState, PurchaseError> {
        let grace = chrono::Duration::from_std(self.settings.expiry_grace).unwrap_or_default();
        let past_grace = record.expires_at.is_some_and(|at| now >= at + grace);

        if past_grace {
            warn!(purchase_id = %record.purchase_id, error = %err, "Provider silent past expiry");
            return self
                .refund_from(record.purchase_id, PurchaseState::Active, CloseReason::Timeout, None)
                .await;
        }

        debug!(purchase_id = %record.purchase_id, error = %err, "Status check failed");
        Ok(PurchaseState::Active)
    }

    /// CAS into REFUNDING
    async fn refund_from(
        &self,
        id: PurchaseId,
        expected: PurchaseState,
        reason: CloseReason,
        err: Option<&ProviderError>,
    ) -> Result<PurchaseState, PurchaseError> {
        let message = err.map(|e| e.to_string());
        let error = err.zip(message.as_deref()).map(|(e, m)| (e.code(), m));

        if self.store.begin_refund(id, expected, reason, error).await? {
            Ok(PurchaseState::Refunding)
        } else {
            self.current_state(id).await
        }
    }

    /// Plain CAS; a lost race reports whatever state won
    async fn advance(
        &self,
        id: PurchaseId,
        expected: PurchaseState,
        new: PurchaseState,
    ) -> Result<PurchaseState, PurchaseError> {
        if self.store.update_state_if(id, expected, new).await? {
            Ok(new)
        } else {
            self.current_state(id).await
        }
    }

    async fn current_state(&self, id: PurchaseId) -> Result<PurchaseState, PurchaseError> {
        match self.store.get(id).await? {
            Some(r) => Ok(r.state),
            None => {
                error!(purchase_id = %id, "Purchase not found after CAS failure");
                Err(PurchaseError::NotFound(id.to_string()))
            }
        }
    }

    async fn load(&self, id: PurchaseId) -> Result<PurchaseRecord, PurchaseError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| PurchaseError::NotFound(id.to_string()))
    }

    fn order_of(&self, record: &PurchaseRecord) -> Result<OrderRef, PurchaseError> {
        record.order_ref().ok_or_else(|| {
            PurchaseError::SystemError(format!(
                "purchase {} is {} without a provider order",
                record.purchase_id, record.state
            ))
        })
    }
}

async fn cancel_order(
    provider: &dyn SmsProvider,
    kind: PurchaseKind,
    order: &OrderRef,
) -> Result<(), ProviderError> {
    match kind {
        PurchaseKind::Activation => provider.cancel_activation(order).await,
        PurchaseKind::Rental => provider.cancel_rent(order).await,
    }
}
