//! `SqliteDatabase` is a concrete implementation of a settlement engine backend.
//!
//! It uses SQLite as the backend and implements all the database traits defined in the [`crate::traits`] module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, ledger, linkage, makers, new_pool, orders, payout_accounts, webhook_events};
use crate::{
    db_types::{
        BuyerProfile,
        CapabilityFlags,
        Cents,
        DisbursementState,
        LedgerRow,
        LedgerStatus,
        LineItem,
        Maker,
        MakerPayoutAccount,
        NewLedgerRow,
        NewMaker,
        NewOrder,
        Order,
        OrderStatus,
        PaymentLinkage,
        PaymentStatus,
        ProviderKind,
        TransferPlanRow,
    },
    traits::{
        CapabilityUpdate,
        LedgerManagement,
        NewPaymentLinkage,
        NewPlannedTransfer,
        OrderManagement,
        PaymentRecorded,
        PayoutAccountManagement,
        RefundRecorded,
        SettlementDatabase,
        SettlementDbError,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await
    }
}

impl OrderManagement for SqliteDatabase {
    async fn insert_order(&self, order: NewOrder) -> Result<Order, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn fetch_order(&self, order_id: i64) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order(order_id, &mut conn).await?)
    }

    async fn fetch_order_by_number(&self, order_number: &str) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_number(order_number, &mut conn).await?)
    }

    async fn fetch_order_by_session(
        &self,
        provider: ProviderKind,
        session_id: &str,
    ) -> Result<Option<Order>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_session(provider, session_id, &mut conn).await?)
    }

    async fn fetch_line_items(&self, order_id: i64) -> Result<Vec<LineItem>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_line_items(order_id, &mut conn).await?)
    }

    async fn fetch_payment_linkage(&self, order_id: i64) -> Result<Option<PaymentLinkage>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(linkage::fetch_linkage(order_id, &mut conn).await?)
    }

    async fn update_order_status(&self, order_id: i64, status: OrderStatus) -> Result<Order, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::update_order_status(order_id, status, &mut tx).await?;
        tx.commit().await?;
        Ok(order)
    }

    async fn upsert_buyer_profile(&self, profile: BuyerProfile) -> Result<BuyerProfile, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(makers::upsert_buyer_profile(profile, &mut conn).await?)
    }

    async fn fetch_buyer_profile(&self, user_id: &str) -> Result<Option<BuyerProfile>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(makers::fetch_buyer_profile(user_id, &mut conn).await?)
    }

    async fn insert_maker(&self, maker: NewMaker) -> Result<Maker, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        makers::insert_maker(maker, &mut conn).await
    }

    async fn fetch_maker(&self, maker_id: i64) -> Result<Option<Maker>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(makers::fetch_maker(maker_id, &mut conn).await?)
    }

    async fn fetch_maker_for_user(&self, user_id: &str) -> Result<Option<Maker>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(makers::fetch_maker_for_user(user_id, &mut conn).await?)
    }
}

impl LedgerManagement for SqliteDatabase {
    async fn fetch_transfer_plan(&self, order_id: i64) -> Result<Vec<TransferPlanRow>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(linkage::fetch_plan(order_id, &mut conn).await?)
    }

    async fn fetch_ledger_for_order(&self, order_id: i64) -> Result<Vec<LedgerRow>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ledger::fetch_for_order(order_id, &mut conn).await?)
    }

    async fn fetch_ledger_rows(&self, ids: &[i64]) -> Result<Vec<LedgerRow>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ledger::fetch_by_ids(ids, &mut conn).await?)
    }

    async fn fetch_unreleased_reserves(&self) -> Result<Vec<LedgerRow>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ledger::fetch_unreleased_reserves(&mut conn).await?)
    }
}

impl PayoutAccountManagement for SqliteDatabase {
    async fn fetch_payout_account_for_maker(
        &self,
        maker_id: i64,
    ) -> Result<Option<MakerPayoutAccount>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payout_accounts::fetch_for_maker(maker_id, &mut conn).await?)
    }

    async fn fetch_payout_account(&self, account_id: &str) -> Result<Option<MakerPayoutAccount>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(payout_accounts::fetch_by_account_id(account_id, &mut conn).await?)
    }

    async fn insert_payout_account(
        &self,
        maker_id: i64,
        account_id: &str,
        flags: CapabilityFlags,
    ) -> Result<(MakerPayoutAccount, bool), SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let result = payout_accounts::idempotent_insert(maker_id, account_id, flags, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn update_payout_capabilities(
        &self,
        account_id: &str,
        flags: CapabilityFlags,
    ) -> Result<CapabilityUpdate, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let result = payout_accounts::update_capabilities(account_id, flags, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn save_checkout_session(
        &self,
        order_id: i64,
        new_linkage: NewPaymentLinkage,
        plan: Vec<NewPlannedTransfer>,
    ) -> Result<Order, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(SettlementDbError::OrderNotFound(order_id))?;
        let session_id = new_linkage.external_session_id.clone();
        linkage::upsert_linkage(order_id, new_linkage, &mut tx).await?;
        linkage::replace_plan(order_id, plan, &mut tx).await?;
        let order = match order.status {
            OrderStatus::AwaitingPayment => order,
            OrderStatus::Pending => {
                orders::set_status(order_id, OrderStatus::Pending, OrderStatus::AwaitingPayment, None, &mut tx)
                    .await?
                    .ok_or(SettlementDbError::OrderNotFound(order_id))?
            },
            status => {
                return Err(SettlementDbError::IllegalStatusChange { from: status, to: OrderStatus::AwaitingPayment })
            },
        };
        tx.commit().await?;
        debug!("🗃️ Checkout session {session_id} saved for order {}", order.order_number);
        Ok(order)
    }

    async fn record_payment_success(
        &self,
        order_id: i64,
        payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<PaymentRecorded, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(SettlementDbError::OrderNotFound(order_id))?;
        let Some(existing) = linkage::fetch_linkage(order_id, &mut tx).await? else {
            return Ok(PaymentRecorded::NoLinkage);
        };
        match existing.external_payment_id.as_deref() {
            Some(id) if id == payment_id => return Ok(PaymentRecorded::AlreadyRecorded(order)),
            Some(id) => {
                warn!("🗃️ Order {order_id} is already paid by {id}. A second payment {payment_id} arrived.");
                return Ok(PaymentRecorded::NotPayable(order));
            },
            None => {},
        }
        if !order.status.is_unpaid() {
            return Ok(PaymentRecorded::NotPayable(order));
        }
        if linkage::set_payment(order_id, payment_id, paid_at, &mut tx).await?.is_none() {
            // Lost a race against a concurrent delivery of the same payment
            return Ok(PaymentRecorded::AlreadyRecorded(order));
        }
        let paid = orders::set_status(order_id, order.status, OrderStatus::Processing, Some(PaymentStatus::Paid), &mut tx)
            .await?;
        let Some(paid) = paid else {
            return Ok(PaymentRecorded::NotPayable(order));
        };
        tx.commit().await?;
        debug!("🗃️ Payment {payment_id} recorded for order {}", paid.order_number);
        Ok(PaymentRecorded::Recorded(paid))
    }

    async fn expire_checkout(&self, order_id: i64) -> Result<Option<Order>, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(SettlementDbError::OrderNotFound(order_id))?;
        if !order.status.is_unpaid() {
            return Ok(None);
        }
        let expired = orders::set_status(
            order_id,
            order.status,
            OrderStatus::PaymentFailed,
            Some(PaymentStatus::Failed),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        Ok(expired)
    }

    async fn claim_disbursement(&self, order_id: i64) -> Result<Option<PaymentLinkage>, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(linkage::claim_disbursement(order_id, &mut conn).await?)
    }

    async fn complete_disbursement(&self, order_id: i64) -> Result<(), SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let result = linkage::transition_disbursement(
            order_id,
            DisbursementState::InProgress,
            DisbursementState::Completed,
            &mut conn,
        )
        .await?;
        if result.is_none() {
            warn!("🗃️ Disbursement for order {order_id} was not in progress when it completed");
        }
        Ok(())
    }

    async fn release_disbursement(&self, order_id: i64) -> Result<(), SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        let result = linkage::transition_disbursement(
            order_id,
            DisbursementState::InProgress,
            DisbursementState::Pending,
            &mut conn,
        )
        .await?;
        if result.is_none() {
            warn!("🗃️ Disbursement for order {order_id} was not in progress when it was released");
        }
        Ok(())
    }

    async fn open_ledger_rows(&self, order_id: i64, rows: Vec<NewLedgerRow>) -> Result<Vec<LedgerRow>, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(SettlementDbError::OrderNotFound(order_id))?;
        let refunded = order.payment_status == PaymentStatus::Refunded;
        let mut inserted = 0;
        for mut row in rows {
            if refunded {
                row.status = LedgerStatus::Refunded;
            }
            if ledger::insert_if_absent(row, &mut tx).await?.is_some() {
                inserted += 1;
            }
        }
        let stored = ledger::fetch_for_order(order_id, &mut tx).await?;
        tx.commit().await?;
        if refunded && inserted > 0 {
            warn!("🗃️ Order {order_id} was refunded before its ledger was written. {inserted} rows opened as refunded");
        }
        trace!("🗃️ {inserted} ledger rows opened for order {order_id}. {} rows in total", stored.len());
        Ok(stored)
    }

    async fn record_refund(&self, payment_id: &str, amount: Cents) -> Result<RefundRecorded, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let Some(link) = linkage::fetch_linkage_by_payment(payment_id, &mut tx).await? else {
            return Ok(RefundRecorded::UnknownPayment);
        };
        let order_id = link.order_id;
        let order = orders::fetch_order(order_id, &mut tx).await?.ok_or(SettlementDbError::OrderNotFound(order_id))?;
        if order.status == OrderStatus::Refunded {
            if link.refund_amount != Some(amount) {
                linkage::set_refund_amount(order_id, amount, &mut tx).await?;
                tx.commit().await?;
            }
            return Ok(RefundRecorded::AlreadyRefunded(order));
        }
        let refunded =
            orders::set_status(order_id, order.status, OrderStatus::Refunded, Some(PaymentStatus::Refunded), &mut tx)
                .await?
                .ok_or(SettlementDbError::OrderNotFound(order_id))?;
        linkage::set_refund_amount(order_id, amount, &mut tx).await?;
        let ledger_rows_refunded = ledger::refund_rows_for_order(order_id, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Order {} refunded ({amount}). {ledger_rows_refunded} ledger rows marked refunded", refunded.order_number);
        Ok(RefundRecorded::Refunded { order: refunded, refund_amount: amount, ledger_rows_refunded })
    }

    async fn mark_reserves_released(&self, ids: &[i64], transfer_id: &str) -> Result<u64, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let count = ledger::mark_reserves_released(ids, transfer_id, &mut tx).await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn mark_immediate_sent(
        &self,
        ids: &[i64],
        destination: &str,
        transfer_id: Option<&str>,
    ) -> Result<u64, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let count = ledger::mark_immediate_sent(ids, destination, transfer_id, &mut tx).await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn mark_transfer_failed(
        &self,
        ids: &[i64],
        message: &str,
        destination: Option<&str>,
        transfer_key: Option<&str>,
    ) -> Result<u64, SettlementDbError> {
        let mut tx = self.pool.begin().await?;
        let count = ledger::mark_failed(ids, message, destination, transfer_key, &mut tx).await?;
        tx.commit().await?;
        Ok(count)
    }

    async fn stage_transfer(
        &self,
        ids: &[i64],
        destination: &str,
        transfer_key: &str,
    ) -> Result<u64, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ledger::stage_transfer(ids, destination, transfer_key, &mut conn).await?)
    }

    async fn record_ledger_error(
        &self,
        ids: &[i64],
        message: &str,
        count_attempt: bool,
    ) -> Result<u64, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(ledger::record_error(ids, message, count_attempt, &mut conn).await?)
    }

    async fn webhook_event_seen(&self, provider: ProviderKind, event_id: &str) -> Result<bool, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(webhook_events::event_exists(provider, event_id, &mut conn).await?)
    }

    async fn record_webhook_event(
        &self,
        provider: ProviderKind,
        event_id: &str,
        event_type: &str,
    ) -> Result<bool, SettlementDbError> {
        let mut conn = self.pool.acquire().await?;
        Ok(webhook_events::insert_event(provider, event_id, event_type, &mut conn).await?)
    }

    async fn close(&mut self) -> Result<(), SettlementDbError> {
        self.pool.close().await;
        Ok(())
    }
}
