use thiserror::Error;

use crate::{
    db_types::{OrderStatus, ProviderKind},
    spe_api::fee_calculator::FeeError,
    traits::{ProviderError, SettlementDbError},
};

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("Invalid checkout request: {0}")]
    ValidationError(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("Order {0} does not belong to the requesting user")]
    Forbidden(i64),
    #[error("Order {order_id} cannot be paid for in its current state ({status})")]
    OrderNotPayable { order_id: i64, status: OrderStatus },
    #[error("Payments with {0} are not yet available")]
    ServiceUnavailable(ProviderKind),
    #[error("The payment provider could not create a checkout session: {0}")]
    UpstreamError(String),
    #[error("Could not compute the fee split: {0}")]
    FeeError(#[from] FeeError),
    #[error(transparent)]
    DatabaseError(#[from] SettlementDbError),
}

impl From<ProviderError> for CheckoutError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotConfigured(kind) => Self::ServiceUnavailable(kind),
            e => Self::UpstreamError(e.to_string()),
        }
    }
}

/// Errors from disbursement and reserve sweeps. Provider failures are not errors here: they are recorded on the
/// affected ledger rows and reported in the run's result.
#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("Order {0} has not been paid, so its makers cannot be paid")]
    OrderNotPaid(i64),
    #[error(transparent)]
    DatabaseError(#[from] SettlementDbError),
}

/// Webhook reconciliation only fails for infrastructure problems. Events that do not apply are reported as outcomes.
#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    DatabaseError(#[from] SettlementDbError),
    #[error(transparent)]
    SettlementError(#[from] SettlementError),
}

#[derive(Debug, Clone, Error)]
pub enum PayoutAccountError {
    #[error("User {0} is not registered as a maker")]
    NotAMaker(String),
    #[error("Maker {0} does not exist")]
    MakerNotFound(i64),
    #[error("The maker has not been onboarded for payouts yet")]
    NoPayoutAccount,
    #[error("Payouts are not yet available: {0}")]
    ServiceUnavailable(String),
    #[error("The payment provider request failed: {0}")]
    UpstreamError(String),
    #[error(transparent)]
    DatabaseError(#[from] SettlementDbError),
}

impl From<ProviderError> for PayoutAccountError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotConfigured(kind) => Self::ServiceUnavailable(format!("{kind} is not configured")),
            e => Self::UpstreamError(e.to_string()),
        }
    }
}
