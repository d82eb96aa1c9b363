//! # Payment provider clients
//!
//! Thin REST clients for the two payment providers the gateway talks to:
//!
//! * [`StripeApi`]: Stripe Connect. Hosted checkout sessions, transfers to connected accounts, connected account
//!   management and login links.
//! * [`BankTransferApi`]: the bank-transfer provider. Hosted payment pages only; it cannot move money to makers.
//!
//! The clients know nothing about orders or ledgers. They speak the provider's wire format and report failures as
//! [`ProviderApiError`]. Every client is built with a request timeout and never retries on its own.
mod bank_api;
mod config;
mod data_objects;
mod error;
mod helpers;
mod stripe_api;

pub use bank_api::BankTransferApi;
pub use config::{BankTransferConfig, StripeConfig};
pub use data_objects::{
    BankPayment,
    BankPaymentRequest,
    BankWebhookData,
    BankWebhookEvent,
    StripeAccount,
    StripeCheckoutSession,
    StripeEvent,
    StripeEventData,
    StripeLoginLink,
    StripeTransfer,
};
pub use error::ProviderApiError;
pub use helpers::metadata_form_fields;
pub use stripe_api::{NewCheckoutSession, NewConnectedAccount, NewTransfer, StripeApi};
