use crate::{
    db_types::{CapabilityFlags, MakerPayoutAccount},
    traits::{CapabilityUpdate, SettlementDbError},
};

#[allow(async_fn_in_trait)]
pub trait PayoutAccountManagement {
    async fn fetch_payout_account_for_maker(&self, maker_id: i64)
        -> Result<Option<MakerPayoutAccount>, SettlementDbError>;

    async fn fetch_payout_account(&self, account_id: &str) -> Result<Option<MakerPayoutAccount>, SettlementDbError>;

    /// Stores a newly created connected account for the maker. Each maker has at most one account: if one already
    /// exists, it is returned along with `false`.
    async fn insert_payout_account(
        &self,
        maker_id: i64,
        account_id: &str,
        flags: CapabilityFlags,
    ) -> Result<(MakerPayoutAccount, bool), SettlementDbError>;

    /// Writes the flags and the derived status, but only if they differ from what is stored.
    async fn update_payout_capabilities(
        &self,
        account_id: &str,
        flags: CapabilityFlags,
    ) -> Result<CapabilityUpdate, SettlementDbError>;
}
