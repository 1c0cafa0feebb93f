//! Sandbox provider for local development
//!
//! Issues fake numbers and "receives" a code once `code_delay` has elapsed.
//! Service `unavailable` answers `NoNumbers` so the refund path can be
//! exercised by hand.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::error::ProviderError;
use super::{ActivationStatus, OrderRef, ProviderKind, ProviderOrder, SmsMessage, SmsProvider};

const UNAVAILABLE_SERVICE: &str = "unavailable";

struct SandboxOrder {
    created: Instant,
    closed: bool,
}

pub struct SandboxProvider {
    code_delay: Duration,
    next_id: AtomicU64,
    orders: Mutex<HashMap<String, SandboxOrder>>,
}

impl SandboxProvider {
    pub fn new(code_delay: Duration) -> Self {
        Self {
            code_delay,
            next_id: AtomicU64::new(1),
            orders: Mutex::new(HashMap::new()),
        }
    }

    fn issue(&self, service: &str, lifetime: ChronoDuration) -> Result<ProviderOrder, ProviderError> {
        if service == UNAVAILABLE_SERVICE {
            return Err(ProviderError::NoNumbers);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let order_id = format!("sbx-{id}");
        self.orders.lock().map_err(poisoned)?.insert(
            order_id.clone(),
            SandboxOrder {
                created: Instant::now(),
                closed: false,
            },
        );
        Ok(ProviderOrder {
            order_id,
            phone: format!("+1555{:07}", id % 10_000_000),
            cost: None,
            expires_at: Some(Utc::now() + lifetime),
        })
    }

    /// Deterministic six digit code per order
    fn code_for(order_id: &str) -> String {
        let sum = order_id
            .bytes()
            .fold(7u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        format!("{:06}", sum % 1_000_000)
    }

    /// `(closed, code ready)` of a known order
    fn delivered(&self, order_id: &str) -> Result<Option<(bool, bool)>, ProviderError> {
        let orders = self.orders.lock().map_err(poisoned)?;
        Ok(orders
            .get(order_id)
            .map(|o| (o.closed, o.created.elapsed() >= self.code_delay)))
    }

    fn close(&self, order_id: &str) -> Result<(), ProviderError> {
        let mut orders = self.orders.lock().map_err(poisoned)?;
        match orders.get_mut(order_id) {
            Some(order) => {
                order.closed = true;
                Ok(())
            }
            None => Err(ProviderError::Rejected(format!("unknown order {order_id}"))),
        }
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> ProviderError {
    ProviderError::Unexpected("sandbox state poisoned".into())
}

#[async_trait]
impl SmsProvider for SandboxProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Sandbox
    }

    async fn buy_activation(
        &self,
        service: &str,
        _country: &str,
    ) -> Result<ProviderOrder, ProviderError> {
        self.issue(service, ChronoDuration::minutes(20))
    }

    async fn check_activation(&self, order: &OrderRef) -> Result<ActivationStatus, ProviderError> {
        match self.delivered(&order.order_id)? {
            None => Ok(ActivationStatus::Expired),
            Some((true, _)) => Ok(ActivationStatus::Cancelled),
            Some((false, false)) => Ok(ActivationStatus::Waiting),
            Some((false, true)) => {
                let code = Self::code_for(&order.order_id);
                Ok(ActivationStatus::Received {
                    text: Some(format!("Your {} code is {}", order.service, code)),
                    code,
                })
            }
        }
    }

    async fn cancel_activation(&self, order: &OrderRef) -> Result<(), ProviderError> {
        self.close(&order.order_id)
    }

    async fn finish_activation(&self, order: &OrderRef) -> Result<(), ProviderError> {
        self.close(&order.order_id)
    }

    async fn rent_number(
        &self,
        service: &str,
        _country: &str,
        hours: u32,
    ) -> Result<ProviderOrder, ProviderError> {
        self.issue(service, ChronoDuration::hours(hours as i64))
    }

    async fn rent_messages(&self, order: &OrderRef) -> Result<Vec<SmsMessage>, ProviderError> {
        match self.delivered(&order.order_id)? {
            Some((_, true)) => Ok(vec![SmsMessage::new(
                Some("Sandbox".to_string()),
                format!("Your {} code is {}", order.service, Self::code_for(&order.order_id)),
                Some(Utc::now().to_rfc3339()),
            )]),
            _ => Ok(Vec::new()),
        }
    }

    async fn cancel_rent(&self, order: &OrderRef) -> Result<(), ProviderError> {
        self.close(&order.order_id)
    }
}
