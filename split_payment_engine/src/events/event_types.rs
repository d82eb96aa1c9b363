use serde::{Deserialize, Serialize};

use crate::db_types::Cents;

/// A transactional message the settlement flow wants sent. Intents are collected while an event is handled and
/// dispatched afterwards; a failure to deliver one never affects payment or ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum NotificationIntent {
    /// Sent to the buyer when their order is confirmed as paid
    OrderConfirmation {
        order_id: i64,
        order_number: String,
        recipient: Option<String>,
        total: Cents,
        currency: String,
    },
    /// Receipt for the buyer's payment
    PaymentReceived {
        order_id: i64,
        order_number: String,
        recipient: Option<String>,
        amount: Cents,
        currency: String,
    },
    /// Tells a maker that one of their products was sold
    MakerNewOrder {
        maker_id: i64,
        order_id: i64,
        order_number: String,
        recipient: String,
        item_count: usize,
        gross: Cents,
        currency: String,
    },
}

impl NotificationIntent {
    pub fn template(&self) -> &'static str {
        match self {
            Self::OrderConfirmation { .. } => "order_confirmation",
            Self::PaymentReceived { .. } => "payment_received",
            Self::MakerNewOrder { .. } => "maker_new_order",
        }
    }

    pub fn recipient(&self) -> Option<&str> {
        match self {
            Self::OrderConfirmation { recipient, .. } | Self::PaymentReceived { recipient, .. } => recipient.as_deref(),
            Self::MakerNewOrder { recipient, .. } => Some(recipient.as_str()),
        }
    }

    pub fn order_id(&self) -> i64 {
        match self {
            Self::OrderConfirmation { order_id, .. } |
            Self::PaymentReceived { order_id, .. } |
            Self::MakerNewOrder { order_id, .. } => *order_id,
        }
    }
}
