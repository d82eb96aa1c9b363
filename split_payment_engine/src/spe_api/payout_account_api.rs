use std::fmt::Debug;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Maker, MakerPayoutAccount},
    helpers::with_timeout,
    spe_api::{errors::PayoutAccountError, settlement_config::SettlementConfig},
    traits::{CapabilityUpdate, ConnectedAccountRequest, PaymentProvider, SettlementDatabase},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OnboardingResult {
    pub account: MakerPayoutAccount,
    /// False if the maker already had a payout account
    pub created: bool,
}

/// Manages makers' connected accounts with the payment provider.
pub struct PayoutAccountApi<B, P> {
    db: B,
    provider: P,
    config: SettlementConfig,
}

impl<B, P> Debug for PayoutAccountApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PayoutAccountApi")
    }
}

impl<B, P> PayoutAccountApi<B, P> {
    pub fn new(db: B, provider: P, config: SettlementConfig) -> Self {
        Self { db, provider, config }
    }
}

impl<B, P> PayoutAccountApi<B, P>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    /// Opens a connected account for the maker registered to `user_id`. Makers that already have an account get
    /// their existing one back.
    pub async fn onboard_maker(&self, user_id: &str) -> Result<OnboardingResult, PayoutAccountError> {
        let maker = self.maker_for_user(user_id).await?;
        if let Some(account) = self.db.fetch_payout_account_for_maker(maker.id).await? {
            debug!("🏦️ Maker #{} already has payout account {}", maker.id, account.account_id);
            return Ok(OnboardingResult { account, created: false });
        }
        let request = ConnectedAccountRequest { country: maker.country.clone(), email: maker.email.clone() };
        let connected =
            with_timeout(self.config.provider_timeout, self.provider.create_connected_account(request)).await?;
        let (account, created) =
            self.db.insert_payout_account(maker.id, &connected.account_id, connected.flags).await?;
        if created {
            info!("🏦️ Opened payout account {} for maker #{}", account.account_id, maker.id);
        } else {
            warn!(
                "🏦️ Maker #{} was onboarded concurrently. Connected account {} is unused and can be removed at the \
                 provider.",
                maker.id, connected.account_id
            );
        }
        Ok(OnboardingResult { account, created })
    }

    pub async fn payout_account(&self, user_id: &str) -> Result<MakerPayoutAccount, PayoutAccountError> {
        let maker = self.maker_for_user(user_id).await?;
        self.db.fetch_payout_account_for_maker(maker.id).await?.ok_or(PayoutAccountError::NoPayoutAccount)
    }

    /// A short-lived link to the provider's dashboard for the maker's connected account.
    pub async fn login_link(&self, user_id: &str) -> Result<String, PayoutAccountError> {
        let account = self.payout_account(user_id).await?;
        let link =
            with_timeout(self.config.provider_timeout, self.provider.create_login_link(&account.account_id)).await?;
        Ok(link)
    }

    /// Pulls the account's capability flags from the provider and stores them if they changed.
    pub async fn refresh_account(&self, maker_id: i64) -> Result<CapabilityUpdate, PayoutAccountError> {
        self.db.fetch_maker(maker_id).await?.ok_or(PayoutAccountError::MakerNotFound(maker_id))?;
        let account = self
            .db
            .fetch_payout_account_for_maker(maker_id)
            .await?
            .ok_or(PayoutAccountError::NoPayoutAccount)?;
        let remote =
            with_timeout(self.config.provider_timeout, self.provider.fetch_connected_account(&account.account_id))
                .await?;
        let update = self.db.update_payout_capabilities(&account.account_id, remote.flags).await?;
        if let CapabilityUpdate::Changed(acc) = &update {
            info!("🏦️ Payout account {} for maker #{maker_id} is now {}", acc.account_id, acc.status);
        }
        Ok(update)
    }

    async fn maker_for_user(&self, user_id: &str) -> Result<Maker, PayoutAccountError> {
        self.db.fetch_maker_for_user(user_id).await?.ok_or_else(|| PayoutAccountError::NotAMaker(user_id.to_string()))
    }
}
