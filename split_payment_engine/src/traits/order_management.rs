use crate::{
    db_types::{BuyerProfile, LineItem, Maker, NewMaker, NewOrder, Order, OrderStatus, PaymentLinkage, ProviderKind},
    traits::SettlementDbError,
};

/// Reads and writes the order book. Catalog browsing and cart management live elsewhere; this is the subset the
/// settlement flow needs.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    /// Stores the order and its line items in a single transaction. The order starts `pending`/`unpaid` and its
    /// total is the sum of the line items.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, SettlementDbError>;

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, SettlementDbError>;

    async fn fetch_order_by_number(&self, order_number: &str) -> Result<Option<Order>, SettlementDbError>;

    /// Finds the order linked to a provider checkout session.
    async fn fetch_order_by_session(
        &self,
        provider: ProviderKind,
        session_id: &str,
    ) -> Result<Option<Order>, SettlementDbError>;

    async fn fetch_line_items(&self, order_id: i64) -> Result<Vec<LineItem>, SettlementDbError>;

    async fn fetch_payment_linkage(&self, order_id: i64) -> Result<Option<PaymentLinkage>, SettlementDbError>;

    /// Moves the order to `status`, if [`OrderStatus::can_transition_to`] allows it.
    async fn update_order_status(&self, order_id: i64, status: OrderStatus) -> Result<Order, SettlementDbError>;

    async fn upsert_buyer_profile(&self, profile: BuyerProfile) -> Result<BuyerProfile, SettlementDbError>;

    async fn fetch_buyer_profile(&self, user_id: &str) -> Result<Option<BuyerProfile>, SettlementDbError>;

    async fn insert_maker(&self, maker: NewMaker) -> Result<Maker, SettlementDbError>;

    async fn fetch_maker(&self, maker_id: i64) -> Result<Option<Maker>, SettlementDbError>;

    async fn fetch_maker_for_user(&self, user_id: &str) -> Result<Option<Maker>, SettlementDbError>;
}
