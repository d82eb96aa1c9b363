use crate::{
    db_types::{LedgerRow, TransferPlanRow},
    traits::SettlementDbError,
};

#[allow(async_fn_in_trait)]
pub trait LedgerManagement {
    /// The per-line-item split plan stored when the checkout session was created.
    async fn fetch_transfer_plan(&self, order_id: i64) -> Result<Vec<TransferPlanRow>, SettlementDbError>;

    async fn fetch_ledger_for_order(&self, order_id: i64) -> Result<Vec<LedgerRow>, SettlementDbError>;

    async fn fetch_ledger_rows(&self, ids: &[i64]) -> Result<Vec<LedgerRow>, SettlementDbError>;

    /// All rows with an unreleased, positive reserve whose immediate payout went out. Release dates are not
    /// filtered here.
    async fn fetch_unreleased_reserves(&self) -> Result<Vec<LedgerRow>, SettlementDbError>;
}
