//! In-memory purchase store for tests

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

use super::db::PurchaseStore;
use super::error::PurchaseError;
use super::state::{CloseReason, PurchaseState};
use super::types::{OrderDetails, PurchaseId, PurchaseKind, PurchaseRecord};

#[derive(Default)]
pub struct MemoryPurchaseStore {
    records: Mutex<HashMap<PurchaseId, PurchaseRecord>>,
}

impl MemoryPurchaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the record was last touched `secs` ago
    pub fn backdate(&self, id: PurchaseId, secs: i64) {
        if let Some(r) = self.records.lock().unwrap().get_mut(&id) {
            r.updated_at = Utc::now() - chrono::Duration::seconds(secs);
        }
    }

    /// Move the local expiry into the past
    pub fn expire(&self, id: PurchaseId) {
        if let Some(r) = self.records.lock().unwrap().get_mut(&id) {
            r.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        }
    }

    /// Overwrite the state, bypassing CAS (simulates a crash mid-step)
    pub fn force_state(&self, id: PurchaseId, state: PurchaseState) {
        if let Some(r) = self.records.lock().unwrap().get_mut(&id) {
            r.state = state;
        }
    }

    fn cas<F>(&self, id: PurchaseId, expected: PurchaseState, apply: F) -> bool
    where
        F: FnOnce(&mut PurchaseRecord),
    {
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&id) {
            Some(r) if r.state == expected => {
                apply(r);
                r.updated_at = Utc::now();
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl PurchaseStore for MemoryPurchaseStore {
    async fn create(&self, record: &PurchaseRecord) -> Result<PurchaseRecord, PurchaseError> {
        let mut records = self.records.lock().unwrap();
        if let Some(cid) = &record.cid
            && let Some(existing) = records
                .values()
                .find(|r| r.user_id == record.user_id && r.cid.as_ref() == Some(cid))
        {
            return Ok(existing.clone());
        }
        records.insert(record.purchase_id, record.clone());
        Ok(record.clone())
    }

    async fn get(&self, id: PurchaseId) -> Result<Option<PurchaseRecord>, PurchaseError> {
        Ok(self.records.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_cid(
        &self,
        user_id: Uuid,
        cid: &str,
    ) -> Result<Option<PurchaseRecord>, PurchaseError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.user_id == user_id && r.cid.as_deref() == Some(cid))
            .cloned())
    }

    async fn update_state_if(
        &self,
        id: PurchaseId,
        expected: PurchaseState,
        new: PurchaseState,
    ) -> Result<bool, PurchaseError> {
        Ok(self.cas(id, expected, |r| r.state = new))
    }

    async fn update_state_with_error(
        &self,
        id: PurchaseId,
        expected: PurchaseState,
        new: PurchaseState,
        code: &str,
        message: &str,
    ) -> Result<bool, PurchaseError> {
        Ok(self.cas(id, expected, |r| {
            r.state = new;
            r.error_code = Some(code.to_string());
            r.error_message = Some(message.to_string());
        }))
    }

    async fn begin_refund(
        &self,
        id: PurchaseId,
        expected: PurchaseState,
        reason: CloseReason,
        error: Option<(&str, &str)>,
    ) -> Result<bool, PurchaseError> {
        Ok(self.cas(id, expected, |r| {
            r.state = PurchaseState::Refunding;
            r.close_reason = Some(reason);
            if let Some((code, message)) = error {
                r.error_code = Some(code.to_string());
                r.error_message = Some(message.to_string());
            }
        }))
    }

    async fn attach_order(
        &self,
        id: PurchaseId,
        order: &OrderDetails,
    ) -> Result<bool, PurchaseError> {
        Ok(self.cas(id, PurchaseState::Ordering, |r| {
            r.state = PurchaseState::Active;
            r.provider_order_id = Some(order.order_id.clone());
            r.phone = Some(order.phone.clone());
            r.provider_cost = order.cost;
            r.expires_at = Some(order.expires_at);
        }))
    }

    async fn record_sms(
        &self,
        id: PurchaseId,
        code: Option<&str>,
        text: Option<&str>,
    ) -> Result<(), PurchaseError> {
        self.cas(id, PurchaseState::Active, |r| {
            r.sms_code = code.map(str::to_string);
            r.sms_text = text.map(str::to_string);
        });
        Ok(())
    }

    async fn increment_retry(&self, id: PurchaseId) -> Result<(), PurchaseError> {
        if let Some(r) = self.records.lock().unwrap().get_mut(&id) {
            r.retry_count += 1;
        }
        Ok(())
    }

    async fn find_stale(
        &self,
        threshold: Duration,
        limit: i64,
    ) -> Result<Vec<PurchaseRecord>, PurchaseError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(threshold).unwrap_or_default();
        let mut stale: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| {
                !r.state.is_terminal() && r.state != PurchaseState::Active && r.updated_at < cutoff
            })
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.updated_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }

    async fn find_active(&self, limit: i64) -> Result<Vec<PurchaseRecord>, PurchaseError> {
        let mut active: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.state == PurchaseState::Active)
            .cloned()
            .collect();
        active.sort_by_key(|r| r.updated_at);
        active.truncate(limit as usize);
        Ok(active)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        kind: Option<PurchaseKind>,
        limit: i64,
    ) -> Result<Vec<PurchaseRecord>, PurchaseError> {
        let mut list: Vec<_> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.user_id == user_id && kind.is_none_or(|k| r.kind == k))
            .cloned()
            .collect();
        list.sort_by(|a, b| b.purchase_id.cmp(&a.purchase_id));
        list.truncate(limit as usize);
        Ok(list)
    }

    async fn holding_totals(&self) -> Result<HashMap<Uuid, Decimal>, PurchaseError> {
        let mut totals = HashMap::new();
        for r in self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.state.holds_funds())
        {
            *totals.entry(r.user_id).or_insert(Decimal::ZERO) += r.price;
        }
        Ok(totals)
    }
}
