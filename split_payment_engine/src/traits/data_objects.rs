use serde::{Deserialize, Serialize};

use crate::db_types::{Cents, MakerPayoutAccount, Order, ProviderKind};

#[derive(Debug, Clone)]
pub struct NewPaymentLinkage {
    pub provider: ProviderKind,
    pub external_session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPlannedTransfer {
    pub maker_id: i64,
    pub line_item_id: i64,
    pub destination: Option<String>,
    pub gross: Cents,
    pub platform_fee: Cents,
    pub immediate: Cents,
    pub reserve: Cents,
}

/// Result of recording a confirmed charge against an order.
#[derive(Debug, Clone)]
pub enum PaymentRecorded {
    /// The order moved to `processing`/`paid`.
    Recorded(Order),
    /// This payment was recorded before. The order is returned as it stands.
    AlreadyRecorded(Order),
    /// The order can no longer accept a payment (it was cancelled, refunded or expired first).
    NotPayable(Order),
    /// There is no checkout session stored for the order.
    NoLinkage,
}

#[derive(Debug, Clone)]
pub enum RefundRecorded {
    Refunded { order: Order, refund_amount: Cents, ledger_rows_refunded: u64 },
    AlreadyRefunded(Order),
    /// No order is linked to the refunded payment.
    UnknownPayment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CapabilityUpdate {
    Changed(MakerPayoutAccount),
    Unchanged(MakerPayoutAccount),
    NotFound,
}
