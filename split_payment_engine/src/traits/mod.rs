//! # Backend contracts
//!
//! The settlement engine is written against these traits, never against a concrete database or provider client.
//!
//! * [`OrderManagement`] reads and writes orders, line items, makers and buyer profiles.
//! * [`LedgerManagement`] queries transfer plans and ledger rows.
//! * [`PayoutAccountManagement`] stores makers' connected accounts and their capability flags.
//! * [`SettlementDatabase`] groups the multi-step, atomic state changes that the settlement flow relies on for
//!   idempotency (claiming a disbursement, recording a payment, releasing reserves and so on).
//! * [`PaymentProvider`] is the external payment provider: hosted checkout, transfers and connected accounts.
mod data_objects;
mod ledger_management;
mod order_management;
mod payment_provider;
mod payout_account_management;
mod settlement_database;

pub use data_objects::{CapabilityUpdate, NewPaymentLinkage, NewPlannedTransfer, PaymentRecorded, RefundRecorded};
pub use ledger_management::LedgerManagement;
pub use order_management::OrderManagement;
pub use payment_provider::{
    CheckoutSession,
    CheckoutSessionRequest,
    ConnectedAccount,
    ConnectedAccountRequest,
    PaymentProvider,
    ProviderError,
    TransferReceipt,
    TransferRequest,
};
pub use payout_account_management::PayoutAccountManagement;
pub use settlement_database::{SettlementDatabase, SettlementDbError};
