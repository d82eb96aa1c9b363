//! # Settlement engine public API
//!
//! Each API covers one stage of the settlement flow and is built from a database backend and, where it talks to the
//! outside world, a [`PaymentProvider`](crate::traits::PaymentProvider).
//!
//! * [`fee_calculator`] splits a payment into platform fee, immediate payout and reserve.
//! * [`checkout_api`] creates a provider checkout session for an unpaid order and stores the split plan.
//! * [`reconciler_api`] applies provider webhooks: payments, expired sessions, refunds and account updates.
//! * [`disbursement_api`] pays makers their immediate share once a payment clears, and retries failed payouts.
//! * [`sweeper_api`] releases withheld reserves once the hold window has passed.
//! * [`payout_account_api`] onboards makers with the provider and keeps their account status current.
//!
//! ```rust,ignore
//! let db = SqliteDatabase::new_with_url(&url, 5).await?;
//! let api = SweeperApi::new(db, provider, SettlementConfig::default());
//! let report = api.run_sweep(Utc::now()).await?;
//! ```
pub mod checkout_api;
pub mod disbursement_api;
pub mod errors;
pub mod fee_calculator;
pub mod payout_account_api;
pub mod provider_events;
pub mod reconciler_api;
pub mod settlement_config;
pub mod sweeper_api;
