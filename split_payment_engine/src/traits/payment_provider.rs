use std::collections::BTreeMap;

use thiserror::Error;

use crate::db_types::{CapabilityFlags, Cents, ProviderKind};

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("{0} payments are not configured")]
    NotConfigured(ProviderKind),
    #[error("The provider rejected the request: {0}")]
    Rejected(String),
    #[error("The provider did not respond in time")]
    Timeout,
    #[error("Could not reach the provider: {0}")]
    Transport(String),
}

impl ProviderError {
    /// True when the provider may have acted on the request even though no answer arrived.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub order_id: i64,
    pub order_number: String,
    pub amount: Cents,
    pub currency: String,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    /// Echoed back by the provider on every webhook related to this session
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub amount: Cents,
    pub currency: String,
    pub destination: String,
    pub transfer_group: Option<String>,
    pub metadata: BTreeMap<String, String>,
    /// Deterministic key; the provider returns the original transfer if the same key is submitted twice.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    pub transfer_id: String,
}

#[derive(Debug, Clone)]
pub struct ConnectedAccountRequest {
    pub country: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectedAccount {
    pub account_id: String,
    pub flags: CapabilityFlags,
}

/// The payment provider boundary. Implementations must not retry internally: a failed or timed-out call is reported
/// and any retry is left to the operator or the next scheduled run.
#[allow(async_fn_in_trait)]
pub trait PaymentProvider: Clone {
    /// Creates a hosted checkout session with the given provider.
    async fn create_checkout_session(
        &self,
        provider: ProviderKind,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError>;

    /// Moves funds from the platform balance to a maker's connected account.
    async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt, ProviderError>;

    async fn create_connected_account(
        &self,
        request: ConnectedAccountRequest,
    ) -> Result<ConnectedAccount, ProviderError>;

    async fn fetch_connected_account(&self, account_id: &str) -> Result<ConnectedAccount, ProviderError>;

    /// Returns a URL to the provider's dashboard for the connected account.
    async fn create_login_link(&self, account_id: &str) -> Result<String, ProviderError>;
}
