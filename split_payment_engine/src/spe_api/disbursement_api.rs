use std::{collections::BTreeMap, fmt::Debug};

use chrono::Utc;
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{
        reserve_release_time,
        Cents,
        DisbursementState,
        LedgerRow,
        LedgerStatus,
        NewLedgerRow,
        Order,
        PaymentLinkage,
        PaymentStatus,
    },
    helpers::{disbursement_key, retry_key, transfer_metadata, with_timeout},
    spe_api::{errors::SettlementError, settlement_config::SettlementConfig},
    traits::{PaymentProvider, SettlementDatabase, SettlementDbError, TransferRequest},
};

const NO_PAYOUT_ACCOUNT: &str = "maker has no payout account";

/// The result of paying one maker their immediate share of one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MakerPayout {
    pub maker_id: i64,
    pub destination: Option<String>,
    pub amount: Cents,
    pub status: LedgerStatus,
    pub transfer_id: Option<String>,
    pub error: Option<String>,
    pub ledger_row_ids: Vec<i64>,
}

impl MakerPayout {
    fn open(maker_id: i64, rows: &[LedgerRow]) -> Self {
        Self {
            maker_id,
            destination: rows.iter().find_map(|r| r.destination.clone()),
            amount: rows.iter().map(|r| r.immediate).sum::<Cents>(),
            status: LedgerStatus::Pending,
            transfer_id: None,
            error: None,
            ledger_row_ids: rows.iter().map(|r| r.id).collect(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == LedgerStatus::Failed
    }

    /// The payout could not be settled in the database. Its ledger rows are still `pending`.
    pub fn is_unresolved(&self) -> bool {
        self.status == LedgerStatus::Pending
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DisbursementReport {
    pub order_id: i64,
    pub payouts: Vec<MakerPayout>,
}

impl DisbursementReport {
    pub fn new(order_id: i64) -> Self {
        Self { order_id, payouts: vec![] }
    }

    pub fn failed_count(&self) -> usize {
        self.payouts.iter().filter(|p| p.is_failed()).count()
    }

    pub fn succeeded_count(&self) -> usize {
        self.payouts.iter().filter(|p| p.status == LedgerStatus::ImmediateSent).count()
    }

    pub fn unresolved_count(&self) -> usize {
        self.payouts.iter().filter(|p| p.is_unresolved()).count()
    }

    pub fn total_sent(&self) -> Cents {
        self.payouts.iter().filter(|p| p.transfer_id.is_some()).map(|p| p.amount).sum()
    }
}

/// `DisbursementApi` pays makers their immediate share once an order's payment has cleared, and writes the ledger
/// rows that the reserve sweeper later settles.
pub struct DisbursementApi<B, P> {
    db: B,
    provider: P,
    config: SettlementConfig,
}

impl<B, P> Debug for DisbursementApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DisbursementApi")
    }
}

impl<B, P> DisbursementApi<B, P> {
    pub fn new(db: B, provider: P, config: SettlementConfig) -> Self {
        Self { db, provider, config }
    }
}

impl<B, P> DisbursementApi<B, P>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    /// Pays every maker on the order their immediate share.
    ///
    /// Returns `None` without doing anything unless this call wins the claim on the order's disbursement marker,
    /// which only happens once, and only while the order is `processing` and `paid`.
    ///
    /// The ledger rows for every line item are written as `pending` before any money moves. Each maker then gets one
    /// transfer, keyed by order and maker, and their rows are settled as `immediate_sent` or `failed`. The order is
    /// re-read before every transfer, so makers are not paid once a refund has been recorded. Neither a transfer
    /// failure nor a database error for one maker stops the others from being paid. If any maker's rows could not be
    /// settled, the marker stays `in_progress` until [`Self::resume_disbursement`] finishes the job.
    pub async fn disburse_order(&self, order_id: i64) -> Result<Option<DisbursementReport>, SettlementError> {
        let Some(linkage) = self.db.claim_disbursement(order_id).await? else {
            debug!("💸️ Order #{order_id} is not eligible for disbursement, or it has already been claimed");
            return Ok(None);
        };
        let (order, rows) = match self.open_ledger(order_id, &linkage).await {
            Ok(opened) => opened,
            Err(e) => {
                // No transfer has been attempted, so the claim can be handed back for a redelivery to pick up
                if let Err(release) = self.db.release_disbursement(order_id).await {
                    error!("💸️ Could not release the disbursement claim on order #{order_id}. {release}");
                }
                return Err(e);
            },
        };
        let report = self.pay_open_rows(&order, rows).await;
        self.finish(&order, &report).await;
        Ok(Some(report))
    }

    /// Finishes a disbursement that was interrupted, for example by a database outage or a crash between transfers.
    ///
    /// Missing ledger rows are written and every maker whose rows are still `pending` is paid. Transfers reuse the
    /// keys of the interrupted run, so a maker whose transfer already went out is not paid again. A disbursement that
    /// was never claimed is run from the start; a completed one is left alone.
    pub async fn resume_disbursement(&self, order_id: i64) -> Result<DisbursementReport, SettlementError> {
        let linkage = self.db.fetch_payment_linkage(order_id).await?.ok_or(SettlementError::OrderNotPaid(order_id))?;
        match linkage.disbursement {
            DisbursementState::Pending => {
                return self.disburse_order(order_id).await?.ok_or(SettlementError::OrderNotPaid(order_id));
            },
            DisbursementState::Completed => {
                info!("💸️ Disbursement for order #{order_id} is already complete");
                return Ok(DisbursementReport::new(order_id));
            },
            DisbursementState::InProgress => {},
        }
        info!("💸️ Resuming the disbursement for order #{order_id}");
        let (order, rows) = self.open_ledger(order_id, &linkage).await?;
        let report = self.pay_open_rows(&order, rows).await;
        self.finish(&order, &report).await;
        Ok(report)
    }

    async fn open_ledger(
        &self,
        order_id: i64,
        linkage: &PaymentLinkage,
    ) -> Result<(Order, Vec<LedgerRow>), SettlementError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(SettlementError::OrderNotFound(order_id))?;
        let paid_at = linkage.paid_at.unwrap_or_else(Utc::now);
        let release_at = reserve_release_time(paid_at, self.config.fees.reserve_window());
        let plan = self.db.fetch_transfer_plan(order_id).await?;
        if plan.is_empty() {
            warn!("💸️ Order #{order_id} was paid but has no transfer plan. No makers will be paid.");
        }
        let new_rows = plan
            .into_iter()
            .map(|r| NewLedgerRow {
                order_id,
                line_item_id: r.line_item_id,
                maker_id: r.maker_id,
                destination: r.destination,
                gross: r.gross,
                platform_fee: r.platform_fee,
                immediate: r.immediate,
                reserve: r.reserve,
                reserve_release_at: release_at,
                status: LedgerStatus::Pending,
                transfer_key: Some(disbursement_key(order_id, r.maker_id)),
                currency: order.currency.clone(),
            })
            .collect();
        let rows = self.db.open_ledger_rows(order_id, new_rows).await?;
        Ok((order, rows))
    }

    async fn pay_open_rows(&self, order: &Order, rows: Vec<LedgerRow>) -> DisbursementReport {
        let mut report = DisbursementReport::new(order.id);
        for (maker_id, rows) in group_by_maker(rows.into_iter().filter(|r| r.status == LedgerStatus::Pending)) {
            let mut payout = MakerPayout::open(maker_id, &rows);
            if let Err(e) = self.pay_maker(order, &rows, &mut payout).await {
                error!(
                    "💸️ The payout to maker #{maker_id} for order #{} is unresolved. {e}. Its ledger rows stay pending \
                     until the disbursement is resumed.",
                    order.id
                );
                payout.status = LedgerStatus::Pending;
                payout.error = Some(e.to_string());
            }
            report.payouts.push(payout);
        }
        report
    }

    async fn pay_maker(
        &self,
        order: &Order,
        rows: &[LedgerRow],
        payout: &mut MakerPayout,
    ) -> Result<(), SettlementDbError> {
        let maker_id = payout.maker_id;
        let paid = self.db.fetch_order(order.id).await?.is_some_and(|o| o.payment_status == PaymentStatus::Paid);
        if !paid {
            info!("💸️ Order #{} is no longer paid. Maker #{maker_id} will not be paid for it.", order.id);
            payout.status = LedgerStatus::Refunded;
            return Ok(());
        }
        if payout.destination.is_none() {
            // The maker may have onboarded between checkout and payment
            payout.destination = self.db.fetch_payout_account_for_maker(maker_id).await?.map(|a| a.account_id);
        }
        let key = rows.iter().find_map(|r| r.transfer_key.clone()).unwrap_or_else(|| disbursement_key(order.id, maker_id));
        self.transfer(order, &key, payout).await
    }

    /// Makes the transfer for one maker and settles their ledger rows with the outcome. The key is kept on failed rows
    /// whenever the provider may have acted on it, so the next attempt repeats it rather than paying again.
    async fn transfer(&self, order: &Order, key: &str, payout: &mut MakerPayout) -> Result<(), SettlementDbError> {
        let maker_id = payout.maker_id;
        let ids = payout.ledger_row_ids.clone();
        let amount = payout.amount;
        let Some(destination) = payout.destination.clone() else {
            warn!("💸️ Maker #{maker_id} cannot be paid for order #{}: {NO_PAYOUT_ACCOUNT}", order.id);
            self.db.mark_transfer_failed(&ids, NO_PAYOUT_ACCOUNT, None, None).await?;
            payout.status = LedgerStatus::Failed;
            payout.error = Some(NO_PAYOUT_ACCOUNT.to_string());
            return Ok(());
        };
        if !amount.is_positive() {
            self.db.mark_immediate_sent(&ids, &destination, None).await?;
            payout.status = LedgerStatus::ImmediateSent;
            return Ok(());
        }
        let request = TransferRequest {
            amount,
            currency: order.currency.clone(),
            destination: destination.clone(),
            transfer_group: Some(format!("order-{}", order.id)),
            metadata: maker_metadata(Some(order.id), maker_id, &ids),
            idempotency_key: key.to_string(),
        };
        match with_timeout(self.config.provider_timeout, self.provider.create_transfer(request)).await {
            Ok(receipt) => {
                debug!("💸️ Sent {amount} to maker #{maker_id} for order #{}: {}", order.id, receipt.transfer_id);
                payout.transfer_id = Some(receipt.transfer_id.clone());
                let moved = self.db.mark_immediate_sent(&ids, &destination, Some(&receipt.transfer_id)).await?;
                payout.status = LedgerStatus::ImmediateSent;
                if moved < ids.len() as u64 {
                    warn!(
                        "💸️ Transfer {} to maker #{maker_id} went out, but only {moved} of {} ledger rows of order #{} \
                         were still open. The order was refunded while it was being paid.",
                        receipt.transfer_id,
                        ids.len(),
                        order.id
                    );
                    if moved == 0 {
                        payout.status = LedgerStatus::Refunded;
                    }
                }
            },
            Err(e) => {
                let kept_key = if e.is_ambiguous() {
                    warn!(
                        "💸️ Transfer of {amount} to maker #{maker_id} for order #{} has an unknown outcome. {e}. The \
                         next attempt will reuse key {key}.",
                        order.id
                    );
                    Some(key)
                } else {
                    warn!("💸️ Transfer of {amount} to maker #{maker_id} for order #{} failed. {e}", order.id);
                    None
                };
                let moved = self.db.mark_transfer_failed(&ids, &e.to_string(), Some(&destination), kept_key).await?;
                payout.status = if moved == 0 { LedgerStatus::Refunded } else { LedgerStatus::Failed };
                payout.error = Some(e.to_string());
            },
        }
        Ok(())
    }

    async fn finish(&self, order: &Order, report: &DisbursementReport) {
        if report.unresolved_count() > 0 {
            warn!(
                "💸️ Disbursement for order #{} is incomplete. {} maker payouts are unresolved and the disbursement \
                 stays in progress until it is resumed.",
                order.id,
                report.unresolved_count()
            );
            return;
        }
        if let Err(e) = self.db.complete_disbursement(order.id).await {
            error!("💸️ Could not mark the disbursement for order #{} complete. {e}", order.id);
            return;
        }
        info!(
            "💸️ Disbursement for order #{} complete. {} makers paid ({} {} sent), {} failed",
            order.id,
            report.succeeded_count(),
            report.total_sent(),
            order.currency,
            report.failed_count()
        );
    }

    /// Retries the immediate payout for every `failed` ledger row of the order, paying to the maker's current payout
    /// account. Rows of a refunded order are never retried.
    ///
    /// An attempt that timed out or lost its connection may still have gone through at the provider, so it is
    /// repeated under the same idempotency key. Only after a definite rejection does the retry move on to a fresh key,
    /// derived from the attempt number.
    pub async fn retry_failed(&self, order_id: i64) -> Result<DisbursementReport, SettlementError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(SettlementError::OrderNotFound(order_id))?;
        if order.payment_status != PaymentStatus::Paid {
            return Err(SettlementError::OrderNotPaid(order_id));
        }
        let failed = self
            .db
            .fetch_ledger_for_order(order_id)
            .await?
            .into_iter()
            .filter(|r| r.status == LedgerStatus::Failed);
        let mut report = DisbursementReport::new(order_id);
        for (maker_id, rows) in group_by_maker(failed) {
            let mut payout = MakerPayout::open(maker_id, &rows);
            payout.status = LedgerStatus::Failed;
            if let Err(e) = self.retry_maker(&order, &rows, &mut payout).await {
                error!("💸️ Retry for maker #{maker_id} on order #{order_id} could not be recorded. {e}");
                payout.error = Some(e.to_string());
            }
            report.payouts.push(payout);
        }
        if report.payouts.is_empty() {
            info!("💸️ Order #{order_id} has no failed payouts to retry");
            return Ok(report);
        }
        info!(
            "💸️ Retried payouts for order #{order_id}. {} succeeded, {} still failing",
            report.succeeded_count(),
            report.failed_count()
        );
        Ok(report)
    }

    async fn retry_maker(
        &self,
        order: &Order,
        rows: &[LedgerRow],
        payout: &mut MakerPayout,
    ) -> Result<(), SettlementDbError> {
        let maker_id = payout.maker_id;
        if let Some(key) = rows.iter().find_map(|r| r.transfer_key.clone()) {
            if payout.destination.is_some() {
                // Repeat the earlier request exactly, destination included, or the provider treats it as a new one
                return self.transfer(order, &key, payout).await;
            }
        }
        payout.destination = self.db.fetch_payout_account_for_maker(maker_id).await?.map(|a| a.account_id);
        let attempt = rows.iter().map(|r| r.attempts).max().unwrap_or(1);
        let key = retry_key(order.id, maker_id, attempt);
        if let Some(destination) = &payout.destination {
            self.db.stage_transfer(&payout.ledger_row_ids, destination, &key).await?;
        }
        self.transfer(order, &key, payout).await
    }
}

fn group_by_maker<I: IntoIterator<Item = LedgerRow>>(rows: I) -> BTreeMap<i64, Vec<LedgerRow>> {
    let mut groups = BTreeMap::<i64, Vec<LedgerRow>>::new();
    for row in rows {
        groups.entry(row.maker_id).or_default().push(row);
    }
    groups
}

pub(crate) fn maker_metadata(order_id: Option<i64>, maker_id: i64, ids: &[i64]) -> BTreeMap<String, String> {
    let mut metadata = transfer_metadata(order_id, ids);
    metadata.insert("maker_id".to_string(), maker_id.to_string());
    metadata
}
