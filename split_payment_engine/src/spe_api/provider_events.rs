use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{CapabilityFlags, Cents, ProviderKind};

/// A webhook notification, already authenticated and translated out of the provider's wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderEvent {
    pub provider: ProviderKind,
    /// The provider's own event id. Redeliveries carry the same id.
    pub event_id: String,
    /// The provider's name for the event type, kept for logging and auditing
    pub event_type: String,
    pub kind: ProviderEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderEventKind {
    PaymentSucceeded {
        /// The order id from the session metadata, if present
        order_id: Option<i64>,
        session_id: Option<String>,
        payment_id: String,
        paid_at: DateTime<Utc>,
    },
    SessionExpired {
        order_id: Option<i64>,
        session_id: Option<String>,
    },
    ChargeRefunded {
        payment_id: String,
        amount_refunded: Cents,
    },
    AccountUpdated {
        account_id: String,
        flags: CapabilityFlags,
    },
    Unrecognized,
}

impl ProviderEvent {
    pub fn new<I, T>(provider: ProviderKind, event_id: I, event_type: T, kind: ProviderEventKind) -> Self
    where
        I: Into<String>,
        T: Into<String>,
    {
        Self { provider, event_id: event_id.into(), event_type: event_type.into(), kind }
    }
}
