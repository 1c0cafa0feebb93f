//! Purchase FSM States
//!
//! State IDs are stored as SMALLINT in `purchases.state`; the read views
//! in the init migration depend on these numbers.

use serde::Serialize;
use std::fmt;
use utoipa::ToSchema;

/// Purchase FSM States
///
/// Terminal states: RECEIVED (40), FAILED (-10), TIMEOUT (-30), CANCELLED (-40)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum PurchaseState {
    /// Request validated and recorded, nothing held yet
    Pending = 0,

    /// Price is on hold in the ledger
    Frozen = 10,

    /// Provider order in flight (persist-before-call)
    Ordering = 20,

    /// Number issued, waiting for the SMS
    Active = 30,

    /// Terminal: SMS delivered and the hold charged
    Received = 40,

    /// Terminal: no number issued, hold (if any) released
    Failed = -10,

    /// Releasing the hold
    Refunding = -20,

    /// Terminal: number expired without an SMS, hold released
    Timeout = -30,

    /// Terminal: cancelled by the user or an admin, hold released
    Cancelled = -40,
}

impl PurchaseState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PurchaseState::Received
                | PurchaseState::Failed
                | PurchaseState::Timeout
                | PurchaseState::Cancelled
        )
    }

    /// Funds of this purchase sit in `frozen_balance`
    #[inline]
    pub fn holds_funds(&self) -> bool {
        matches!(
            self,
            PurchaseState::Frozen
                | PurchaseState::Ordering
                | PurchaseState::Active
                | PurchaseState::Refunding
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(PurchaseState::Pending),
            10 => Some(PurchaseState::Frozen),
            20 => Some(PurchaseState::Ordering),
            30 => Some(PurchaseState::Active),
            40 => Some(PurchaseState::Received),
            -10 => Some(PurchaseState::Failed),
            -20 => Some(PurchaseState::Refunding),
            -30 => Some(PurchaseState::Timeout),
            -40 => Some(PurchaseState::Cancelled),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseState::Pending => "PENDING",
            PurchaseState::Frozen => "FROZEN",
            PurchaseState::Ordering => "ORDERING",
            PurchaseState::Active => "ACTIVE",
            PurchaseState::Received => "RECEIVED",
            PurchaseState::Failed => "FAILED",
            PurchaseState::Refunding => "REFUNDING",
            PurchaseState::Timeout => "TIMEOUT",
            PurchaseState::Cancelled => "CANCELLED",
        }
    }

    /// Status shown to users
    pub fn public_status(&self) -> PublicStatus {
        match self {
            PurchaseState::Pending | PurchaseState::Frozen | PurchaseState::Ordering => {
                PublicStatus::Pending
            }
            PurchaseState::Active => PublicStatus::Active,
            PurchaseState::Received => PublicStatus::Received,
            PurchaseState::Timeout => PublicStatus::Timeout,
            PurchaseState::Cancelled => PublicStatus::Cancelled,
            PurchaseState::Failed | PurchaseState::Refunding => PublicStatus::Refunded,
        }
    }
}

impl fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for PurchaseState {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        PurchaseState::from_id(value).ok_or(())
    }
}

/// `activations.status` / `rentals.status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PublicStatus {
    Pending,
    Active,
    Received,
    Timeout,
    Cancelled,
    Refunded,
}

/// Why a purchase entered REFUNDING (`purchases.close_reason`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum CloseReason {
    /// Number expired without an SMS
    Timeout = 1,
    /// User cancelled an active number
    Cancelled = 2,
    /// Provider explicitly refused the order
    ProviderFailure = 3,
    /// Order outcome unknown past the stale threshold
    Stale = 4,
    /// Forced by an admin
    Admin = 5,
}

impl CloseReason {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(CloseReason::Timeout),
            2 => Some(CloseReason::Cancelled),
            3 => Some(CloseReason::ProviderFailure),
            4 => Some(CloseReason::Stale),
            5 => Some(CloseReason::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Timeout => "timeout",
            CloseReason::Cancelled => "cancelled",
            CloseReason::ProviderFailure => "provider_failure",
            CloseReason::Stale => "stale",
            CloseReason::Admin => "admin",
        }
    }

    /// Terminal state reached once the hold is released
    pub fn final_state(&self) -> PurchaseState {
        match self {
            CloseReason::ProviderFailure => PurchaseState::Failed,
            CloseReason::Timeout | CloseReason::Stale => PurchaseState::Timeout,
            CloseReason::Cancelled | CloseReason::Admin => PurchaseState::Cancelled,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
