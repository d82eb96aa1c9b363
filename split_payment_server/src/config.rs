use std::{env, net::IpAddr, time::Duration};

use log::*;
use payment_providers::{BankTransferConfig, StripeConfig};
use spg_common::{
    helpers::{env_flag, env_non_empty},
    Secret,
};
use split_payment_engine::{FeeSchedule, SettlementConfig};

const DEFAULT_SPG_HOST: &str = "127.0.0.1";
const DEFAULT_SPG_PORT: u16 = 8360;
const DEFAULT_PLATFORM_FEE_PERCENT: f64 = 10.0;
const DEFAULT_IMMEDIATE_PAYOUT_PERCENT: f64 = 85.0;
const DEFAULT_RESERVE_WINDOW_DAYS: i64 = 30;
const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_SWEEP_PARALLELISM: usize = 4;
const DEFAULT_SIGNATURE_TOLERANCE: Duration = Duration::from_secs(300);
pub const DEFAULT_AUTH_USER_HEADER: &str = "x-spg-user";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Fee schedule, provider timeout and sweep parallelism handed to the settlement engine
    pub settlement: SettlementConfig,
    /// How often the reserve sweeper runs
    pub sweep_interval: Duration,
    /// The request header in which the upstream authentication layer puts the caller's user id.
    pub auth_user_header: String,
    /// When set, notification intents are POSTed here as JSON. Otherwise they are only logged.
    pub notification_url: Option<String>,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    pub webhooks: WebhookConfig,
    pub stripe: Option<StripeConfig>,
    pub bank: Option<BankTransferConfig>,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub stripe_secret: Secret<String>,
    pub bank_secret: Secret<String>,
    /// Maximum age of a Stripe signature timestamp
    pub stripe_tolerance: Duration,
    /// Set to false to accept unsigned webhooks. **DANGER**: only for local testing.
    pub signature_checks: bool,
    /// If supplied, requests against /webhook endpoints are checked against this list of IP addresses.
    pub whitelist: Option<Vec<IpAddr>>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            stripe_secret: Secret::default(),
            bank_secret: Secret::default(),
            stripe_tolerance: DEFAULT_SIGNATURE_TOLERANCE,
            signature_checks: true,
            whitelist: None,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_SPG_HOST.to_string(),
            port: DEFAULT_SPG_PORT,
            database_url: String::default(),
            settlement: SettlementConfig::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            auth_user_header: DEFAULT_AUTH_USER_HEADER.to_string(),
            notification_url: None,
            use_x_forwarded_for: false,
            use_forwarded: false,
            webhooks: WebhookConfig::default(),
            stripe: None,
            bank: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("SPG_HOST").ok().unwrap_or_else(|| DEFAULT_SPG_HOST.into());
        let port = env::var("SPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for SPG_PORT. {e} Using the default, {DEFAULT_SPG_PORT}, instead."
                    );
                    DEFAULT_SPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_SPG_PORT);
        let database_url = env::var("SPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ SPG_DATABASE_URL is not set. Please set it to the URL for the settlement database.");
            String::default()
        });
        let settlement = configure_settlement();
        let provider_timeout = settlement.provider_timeout;
        let sweep_interval = parse_env_or("SPG_SWEEP_INTERVAL_MINS", DEFAULT_SWEEP_INTERVAL.as_secs() / 60)
            .map(|mins: u64| Duration::from_secs(mins.max(1) * 60))
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);
        let auth_user_header = env_non_empty("SPG_AUTH_USER_HEADER").unwrap_or_else(|| {
            info!("🪛️ SPG_AUTH_USER_HEADER is not set. Expecting the caller's user id in {DEFAULT_AUTH_USER_HEADER}.");
            DEFAULT_AUTH_USER_HEADER.to_string()
        });
        let notification_url = env_non_empty("SPG_NOTIFICATION_URL");
        if notification_url.is_none() {
            warn!("🪛️ SPG_NOTIFICATION_URL is not set. Notifications will be logged, but not sent.");
        }
        let use_x_forwarded_for = env_flag("SPG_USE_X_FORWARDED_FOR", false);
        let use_forwarded = env_flag("SPG_USE_FORWARDED", false);
        let webhooks = WebhookConfig::from_env_or_defaults();
        let stripe = StripeConfig::from_env().map(|c| c.with_timeout(provider_timeout));
        let bank = BankTransferConfig::from_env().map(|c| c.with_timeout(provider_timeout));
        Self {
            host,
            port,
            database_url,
            settlement,
            sweep_interval,
            auth_user_header,
            notification_url,
            use_x_forwarded_for,
            use_forwarded,
            webhooks,
            stripe,
            bank,
        }
    }
}

impl WebhookConfig {
    pub fn from_env_or_defaults() -> Self {
        let stripe_secret = env_non_empty("SPG_STRIPE_WEBHOOK_SECRET").unwrap_or_else(|| {
            error!("🪛️ SPG_STRIPE_WEBHOOK_SECRET is not set. Stripe webhooks will be rejected.");
            String::default()
        });
        let bank_secret = env_non_empty("SPG_BANK_WEBHOOK_SECRET").unwrap_or_else(|| {
            warn!("🪛️ SPG_BANK_WEBHOOK_SECRET is not set. Bank-transfer webhooks will be rejected.");
            String::default()
        });
        let stripe_tolerance =
            parse_env_or("SPG_STRIPE_SIGNATURE_TOLERANCE_SECS", DEFAULT_SIGNATURE_TOLERANCE.as_secs())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_SIGNATURE_TOLERANCE);
        let signature_checks = env_flag("SPG_WEBHOOK_SIGNATURE_CHECKS", true);
        if !signature_checks {
            warn!("🪛️ Webhook signature checks are DISABLED. Anyone can forge payment notifications.");
        }
        let whitelist = env_non_empty("SPG_WEBHOOK_IP_WHITELIST").and_then(|s| parse_whitelist(&s));
        match &whitelist {
            Some(whitelist) if whitelist.is_empty() => {
                warn!(
                    "🪛️ The webhook IP whitelist was configured, but is empty. The server will run, but won't \
                     authorise any incoming webhooks."
                );
            },
            None => {
                info!("🪛️ No webhook IP whitelist is set. Only signature validation will be used.");
            },
            Some(v) => {
                let addrs = v.iter().map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
                info!("🪛️ Webhook IP whitelist: {addrs}");
            },
        }
        Self {
            stripe_secret: Secret::new(stripe_secret),
            bank_secret: Secret::new(bank_secret),
            stripe_tolerance,
            signature_checks,
            whitelist,
        }
    }
}

/// `"none"`, `"false"` and `"0"` explicitly disable the whitelist. Invalid entries are skipped.
pub fn parse_whitelist(s: &str) -> Option<Vec<IpAddr>> {
    if ["none", "false", "0"].contains(&s.to_lowercase().as_str()) {
        info!("🪛️ Webhook IP whitelist is disabled.");
        return None;
    }
    let ip_addrs = s
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            s.parse()
                .map_err(|e| warn!("🪛️ Ignoring invalid IP address ({s}) in SPG_WEBHOOK_IP_WHITELIST: {e}"))
                .ok()
        })
        .collect::<Vec<IpAddr>>();
    Some(ip_addrs)
}

fn configure_settlement() -> SettlementConfig {
    let platform_fee = parse_env_or("SPG_PLATFORM_FEE_PERCENT", DEFAULT_PLATFORM_FEE_PERCENT);
    let immediate = parse_env_or("SPG_IMMEDIATE_PAYOUT_PERCENT", DEFAULT_IMMEDIATE_PAYOUT_PERCENT);
    let window = parse_env_or("SPG_RESERVE_WINDOW_DAYS", DEFAULT_RESERVE_WINDOW_DAYS);
    let fees = match (platform_fee, immediate, window) {
        (Some(fee), Some(immediate), Some(window)) => FeeSchedule::from_percentages(fee, immediate, window)
            .unwrap_or_else(|e| {
                error!("🪛️ {e}. Reverting to the default fee schedule.");
                FeeSchedule::default()
            }),
        _ => {
            error!("🪛️ The fee configuration is invalid. Reverting to the default fee schedule.");
            FeeSchedule::default()
        },
    };
    info!(
        "🪛️ Fee schedule: platform fee {} bps, immediate payout {} bps, reserve {} bps for {} days",
        fees.platform_fee_bps(),
        fees.immediate_payout_bps(),
        fees.reserve_bps(),
        fees.reserve_window().num_days()
    );
    let timeout = parse_env_or("SPG_PROVIDER_TIMEOUT_SECS", DEFAULT_PROVIDER_TIMEOUT.as_secs())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_PROVIDER_TIMEOUT);
    let parallelism = parse_env_or("SPG_SWEEP_PARALLELISM", DEFAULT_SWEEP_PARALLELISM)
        .unwrap_or(DEFAULT_SWEEP_PARALLELISM);
    SettlementConfig::default().with_fees(fees).with_provider_timeout(timeout).with_sweep_parallelism(parallelism)
}

/// Reads and parses `name`. Returns the default when the variable is unset, and `None` when it is set but invalid.
fn parse_env_or<T>(name: &str, default: T) -> Option<T>
where
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match env_non_empty(name) {
        None => {
            info!("🪛️ {name} is not set. Using the default value of {default}.");
            Some(default)
        },
        Some(s) => s.parse::<T>().map_err(|e| warn!("🪛️ Invalid configuration value for {name}: {s}. {e}")).ok(),
    }
}

//-------------------------------------------------  ServerOptions  ----------------------------------------------------
/// A subset of the server configuration that request handlers need. It never contains secrets.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub use_x_forwarded_for: bool,
    pub use_forwarded: bool,
    pub auth_user_header: String,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            use_x_forwarded_for: false,
            use_forwarded: false,
            auth_user_header: DEFAULT_AUTH_USER_HEADER.to_string(),
        }
    }
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            use_x_forwarded_for: config.use_x_forwarded_for,
            use_forwarded: config.use_forwarded,
            auth_user_header: config.auth_user_header.clone(),
        }
    }
}
