//! # Split Payment Gateway server
//!
//! The HTTP front end of the settlement engine. It is responsible for:
//! * Creating hosted checkout sessions for buyers' unpaid orders.
//! * Receiving signed webhooks from the payment providers and handing them to the reconciler, which records payments,
//!   pays makers their immediate share and applies refunds.
//! * Onboarding makers onto the provider's connected-account platform.
//! * Periodically releasing matured reserves (see [`sweep_worker`]).
//! * Dispatching the notification intents that the reconciler produces.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/checkout`: Start a hosted checkout for one of the caller's orders.
//! * `/api/payouts/onboard`, `/api/payouts/account`, `/api/payouts/login_link`: Maker payout account management.
//! * `/webhook/stripe`, `/webhook/bank`: Provider webhooks. These are signature-checked, and optionally restricted to
//!   a whitelist of IP addresses.

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod sweep_worker;

#[cfg(test)]
mod endpoint_tests;
