//! Split Payment Engine
//!
//! The settlement core of a marketplace where one buyer payment is split between several makers and the platform.
//! The platform keeps a fee, each maker is paid an immediate share as soon as the payment clears, and the remainder is
//! held in reserve for a fixed window before it is released.
//!
//! The library is divided into three main sections:
//! 1. Data types ([`mod@db_types`]) and the storage traits ([`mod@traits`]) that a backend must implement. SQLite is the
//!    supported backend.
//! 2. The public API ([`mod@spe_api`]): fee calculation, checkout, webhook reconciliation, disbursement, reserve
//!    sweeps and payout accounts. Every component is generic over its backend and over the
//!    [`PaymentProvider`](traits::PaymentProvider) it talks to, so it can be exercised without a live provider.
//! 3. Events ([`mod@events`]). Notification intents produced while reconciling payments are handed to subscribers
//!    after the settlement state has been committed.

pub mod db_types;
pub mod events;
pub mod helpers;
mod spe_api;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::{db::db_url, SqliteDatabase};
pub use spe_api::{
    checkout_api::{CheckoutApi, CheckoutRedirect, CheckoutRequest},
    disbursement_api::{DisbursementApi, DisbursementReport, MakerPayout},
    errors::{CheckoutError, PayoutAccountError, ReconcileError, SettlementError},
    fee_calculator::{calculate_splits, FeeError, FeeSchedule, FeeSplit, ItemAmount, LineItemSplit, MakerSplit},
    payout_account_api::{OnboardingResult, PayoutAccountApi},
    provider_events::{ProviderEvent, ProviderEventKind},
    reconciler_api::{AppliedEvent, ReconcileOutcome, ReconcilerApi},
    settlement_config::SettlementConfig,
    sweeper_api::{ReserveFailure, ReserveGroupKey, ReserveRelease, SweepReport, SweeperApi},
};
pub use traits::{
    LedgerManagement,
    OrderManagement,
    PaymentProvider,
    PayoutAccountManagement,
    SettlementDatabase,
    SettlementDbError,
};
