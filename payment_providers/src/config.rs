use std::time::Duration;

use log::*;
use spg_common::{helpers::env_non_empty, Secret};

const DEFAULT_STRIPE_API_URL: &str = "https://api.stripe.com";
const DEFAULT_BANK_API_URL: &str = "https://api.bank-transfer.example";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Base URL for the REST API, without a trailing slash. Overridable for test doubles.
    pub api_url: String,
    pub secret_key: Secret<String>,
    /// Optional `Stripe-Version` pin
    pub api_version: Option<String>,
    pub timeout: Duration,
}

impl StripeConfig {
    pub fn new(secret_key: Secret<String>) -> Self {
        Self { api_url: DEFAULT_STRIPE_API_URL.to_string(), secret_key, api_version: None, timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `None` when `SPG_STRIPE_SECRET_KEY` is not set, i.e. Stripe is not configured for this deployment.
    pub fn from_env() -> Option<Self> {
        let secret_key = match env_non_empty("SPG_STRIPE_SECRET_KEY") {
            Some(k) => Secret::new(k),
            None => {
                warn!("🪛️ SPG_STRIPE_SECRET_KEY is not set. Card payments and maker payouts are disabled.");
                return None;
            },
        };
        let api_url = env_non_empty("SPG_STRIPE_API_URL").unwrap_or_else(|| DEFAULT_STRIPE_API_URL.to_string());
        let api_version = env_non_empty("SPG_STRIPE_API_VERSION");
        Some(Self { api_url, secret_key, api_version, timeout: DEFAULT_TIMEOUT })
    }
}

#[derive(Debug, Clone)]
pub struct BankTransferConfig {
    pub api_url: String,
    pub api_key: Secret<String>,
    pub timeout: Duration,
}

impl BankTransferConfig {
    pub fn new(api_url: &str, api_key: Secret<String>) -> Self {
        Self { api_url: api_url.trim_end_matches('/').to_string(), api_key, timeout: DEFAULT_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `None` when `SPG_BANK_API_KEY` is not set.
    pub fn from_env() -> Option<Self> {
        let api_key = match env_non_empty("SPG_BANK_API_KEY") {
            Some(k) => Secret::new(k),
            None => {
                info!("🪛️ SPG_BANK_API_KEY is not set. Bank transfer checkout is disabled.");
                return None;
            },
        };
        let api_url = env_non_empty("SPG_BANK_API_URL").unwrap_or_else(|| {
            warn!("🪛️ SPG_BANK_API_URL not set, using {DEFAULT_BANK_API_URL}");
            DEFAULT_BANK_API_URL.to_string()
        });
        Some(Self::new(&api_url, api_key))
    }
}
