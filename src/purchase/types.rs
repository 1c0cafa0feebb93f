//! Purchase Core Types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::state::{CloseReason, PurchaseState};
use crate::ledger::{Hold, TransactionKind};
use crate::providers::{OrderRef, ProviderKind};

/// Purchase ID - ULID, sortable by creation time
///
/// Also the ledger reference of the purchase's hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PurchaseId(ulid::Ulid);

impl PurchaseId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for PurchaseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PurchaseId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Activation (one code) or rental (leased inbox), `purchases.kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum PurchaseKind {
    Activation = 1,
    Rental = 2,
}

impl PurchaseKind {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(PurchaseKind::Activation),
            2 => Some(PurchaseKind::Rental),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseKind::Activation => "activation",
            PurchaseKind::Rental => "rental",
        }
    }

    pub fn transaction_kind(&self) -> TransactionKind {
        match self {
            PurchaseKind::Activation => TransactionKind::Activation,
            PurchaseKind::Rental => TransactionKind::Rental,
        }
    }
}

impl fmt::Display for PurchaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a client asks for; validated by `PurchaseCoordinator::create`
#[derive(Debug, Clone)]
pub struct PurchaseRequest {
    pub user_id: Uuid,
    pub kind: PurchaseKind,
    pub provider: ProviderKind,
    pub service: String,
    pub country: String,
    /// Rentals only
    pub rent_hours: Option<u32>,
    /// Refuse the purchase when the quote is higher
    pub max_price: Option<Decimal>,
    /// Client idempotency key
    pub cid: Option<String>,
}

impl PurchaseRequest {
    pub fn activation(user_id: Uuid, provider: ProviderKind, service: &str, country: &str) -> Self {
        Self {
            user_id,
            kind: PurchaseKind::Activation,
            provider,
            service: service.to_string(),
            country: country.to_string(),
            rent_hours: None,
            max_price: None,
            cid: None,
        }
    }

    pub fn rental(
        user_id: Uuid,
        provider: ProviderKind,
        service: &str,
        country: &str,
        hours: u32,
    ) -> Self {
        Self {
            rent_hours: Some(hours),
            kind: PurchaseKind::Rental,
            ..Self::activation(user_id, provider, service, country)
        }
    }

    pub fn with_cid(mut self, cid: &str) -> Self {
        self.cid = Some(cid.to_string());
        self
    }

    pub fn with_max_price(mut self, max_price: Decimal) -> Self {
        self.max_price = Some(max_price);
        self
    }
}

/// Provider order data stored when ORDERING → ACTIVE
#[derive(Debug, Clone, PartialEq)]
pub struct OrderDetails {
    pub order_id: String,
    pub phone: String,
    pub cost: Option<Decimal>,
    pub expires_at: DateTime<Utc>,
}

/// Persistent purchase record (`purchases` row)
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRecord {
    pub purchase_id: PurchaseId,
    pub cid: Option<String>,
    pub user_id: Uuid,
    pub kind: PurchaseKind,
    pub provider: ProviderKind,
    pub service: String,
    pub country: String,
    pub rent_hours: Option<i32>,
    /// Resale price; the amount held and charged
    pub price: Decimal,
    pub state: PurchaseState,
    pub close_reason: Option<CloseReason>,
    pub provider_order_id: Option<String>,
    pub phone: Option<String>,
    pub provider_cost: Option<Decimal>,
    pub sms_code: Option<String>,
    pub sms_text: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PurchaseRecord {
    /// Fresh record in PENDING
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        kind: PurchaseKind,
        provider: ProviderKind,
        service: String,
        country: String,
        rent_hours: Option<u32>,
        price: Decimal,
        cid: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            purchase_id: PurchaseId::new(),
            cid,
            user_id,
            kind,
            provider,
            service,
            country,
            rent_hours: rent_hours.map(|h| h as i32),
            price,
            state: PurchaseState::Pending,
            close_reason: None,
            provider_order_id: None,
            phone: None,
            provider_cost: None,
            sms_code: None,
            sms_text: None,
            error_code: None,
            error_message: None,
            retry_count: 0,
            expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Ledger hold for this purchase
    pub fn hold(&self) -> Hold {
        Hold {
            purchase_id: self.purchase_id.to_string(),
            user_id: self.user_id,
            amount: self.price,
            kind: self.kind.transaction_kind(),
            description: format!(
                "{} {} {}/{}",
                self.kind, self.provider, self.service, self.country
            ),
        }
    }

    /// Provider handle, once a number was issued
    pub fn order_ref(&self) -> Option<OrderRef> {
        self.provider_order_id.as_ref().map(|order_id| OrderRef {
            order_id: order_id.clone(),
            service: self.service.clone(),
            country: self.country.clone(),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}
