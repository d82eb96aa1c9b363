use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{Cents, LedgerRow, NewLedgerRow, Order, OrderStatus, PaymentLinkage, ProviderKind},
    traits::{
        data_objects::{NewPaymentLinkage, NewPlannedTransfer, PaymentRecorded, RefundRecorded},
        LedgerManagement,
        OrderManagement,
        PayoutAccountManagement,
    },
};

/// The state changes that drive settlement. Every method here is atomic: it either applies completely or not at all,
/// and the conditional ones (`claim_disbursement`, `mark_reserves_released`, ...) are safe to race against each
/// other and against duplicate webhook deliveries.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone + OrderManagement + LedgerManagement + PayoutAccountManagement {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores the checkout session and the per-maker split plan for the order, and moves the order to
    /// `awaiting_payment`. A previous, unpaid session for the same order is replaced.
    async fn save_checkout_session(
        &self,
        order_id: i64,
        linkage: NewPaymentLinkage,
        plan: Vec<NewPlannedTransfer>,
    ) -> Result<Order, SettlementDbError>;

    /// Records that the provider confirmed payment `payment_id` for the order. The payment id is unique: the same
    /// payment can never be attached to two orders.
    async fn record_payment_success(
        &self,
        order_id: i64,
        payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<PaymentRecorded, SettlementDbError>;

    /// Moves an unpaid order to `payment_failed`. Returns `None` if the order was no longer unpaid.
    async fn expire_checkout(&self, order_id: i64) -> Result<Option<Order>, SettlementDbError>;

    /// Atomically moves the order's disbursement marker from `pending` to `in_progress`, provided the order is
    /// `processing` and `paid`. Only the caller that receives `Some` may pay the makers.
    async fn claim_disbursement(&self, order_id: i64) -> Result<Option<PaymentLinkage>, SettlementDbError>;

    async fn complete_disbursement(&self, order_id: i64) -> Result<(), SettlementDbError>;

    /// Hands an `in_progress` disbursement back to `pending`, so that it can be claimed again. Only valid while no
    /// transfer has been attempted for the order.
    async fn release_disbursement(&self, order_id: i64) -> Result<(), SettlementDbError>;

    /// Writes the ledger rows for the order, skipping line items that already have one, and returns every ledger row
    /// of the order. The order is read in the same transaction: if it has been refunded, the new rows are written as
    /// `refunded` whatever status they were given.
    async fn open_ledger_rows(&self, order_id: i64, rows: Vec<NewLedgerRow>) -> Result<Vec<LedgerRow>, SettlementDbError>;

    /// Marks the order linked to `payment_id` as refunded, and every ledger row of that order that has not completed
    /// as `refunded`.
    async fn record_refund(&self, payment_id: &str, amount: Cents) -> Result<RefundRecorded, SettlementDbError>;

    /// Marks the rows released and `completed`, but only those that are still `immediate_sent` and unreleased.
    /// Returns the number of rows updated.
    async fn mark_reserves_released(&self, ids: &[i64], transfer_id: &str) -> Result<u64, SettlementDbError>;

    /// Moves `pending` or `failed` rows to `immediate_sent` after a successful transfer. Rows refunded in the meantime
    /// are left refunded. Returns the number of rows moved.
    async fn mark_immediate_sent(
        &self,
        ids: &[i64],
        destination: &str,
        transfer_id: Option<&str>,
    ) -> Result<u64, SettlementDbError>;

    /// Moves `pending` or `failed` rows to `failed`, and records the destination that was attempted, if any.
    /// `transfer_key` is the key to reuse on the next attempt, and must be kept whenever the provider may have
    /// executed the transfer.
    async fn mark_transfer_failed(
        &self,
        ids: &[i64],
        message: &str,
        destination: Option<&str>,
        transfer_key: Option<&str>,
    ) -> Result<u64, SettlementDbError>;

    /// Records the destination and idempotency key of a retry on `failed` rows before the transfer is attempted.
    async fn stage_transfer(&self, ids: &[i64], destination: &str, transfer_key: &str)
        -> Result<u64, SettlementDbError>;

    /// Stores an error message on the rows without changing their status. If `count_attempt` is set, the rows'
    /// attempt counter is incremented as well.
    async fn record_ledger_error(&self, ids: &[i64], message: &str, count_attempt: bool)
        -> Result<u64, SettlementDbError>;

    async fn webhook_event_seen(&self, provider: ProviderKind, event_id: &str) -> Result<bool, SettlementDbError>;

    /// Returns false if the event had already been recorded.
    async fn record_webhook_event(
        &self,
        provider: ProviderKind,
        event_id: &str,
        event_type: &str,
    ) -> Result<bool, SettlementDbError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), SettlementDbError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum SettlementDbError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("The requested order {0} does not exist")]
    OrderNotFound(i64),
    #[error("An order with number {0} already exists")]
    OrderAlreadyExists(String),
    #[error("The order contains no line items")]
    EmptyOrder,
    #[error("The order total overflows")]
    OrderTotalOverflow,
    #[error("The requested order change is forbidden. Cannot move from {from} to {to}.")]
    IllegalStatusChange { from: OrderStatus, to: OrderStatus },
    #[error("Payment {0} is already linked to a different order")]
    PaymentAlreadyLinked(String),
    #[error("Order {0} has already been paid; its checkout session cannot be replaced")]
    CheckoutLocked(i64),
    #[error("A maker already exists for user {0}")]
    MakerAlreadyExists(String),
}

impl From<sqlx::Error> for SettlementDbError {
    fn from(e: sqlx::Error) -> Self {
        SettlementDbError::DatabaseError(e.to_string())
    }
}
