//! Releases withheld reserves once their hold window has passed.
//!
//! A sweep selects every ledger row whose reserve is due, groups the rows by maker, destination account and currency,
//! and makes one transfer per group. The transfer is keyed by the group's ledger row ids, so a sweep that is
//! interrupted and re-run cannot pay the same reserve twice.
use std::{collections::BTreeMap, fmt::Debug};

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Cents, LedgerRow},
    helpers::{reserve_release_key, with_timeout},
    spe_api::{disbursement_api::maker_metadata, errors::SettlementError, settlement_config::SettlementConfig},
    traits::{PaymentProvider, SettlementDatabase, TransferRequest},
};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReserveGroupKey {
    pub maker_id: i64,
    pub destination: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRelease {
    pub group: ReserveGroupKey,
    pub amount: Cents,
    pub transfer_id: String,
    pub ledger_row_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveFailure {
    pub group: ReserveGroupKey,
    pub amount: Cents,
    pub error: String,
    pub ledger_row_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepReport {
    /// Rows that were due when the sweep started
    pub eligible_rows: usize,
    pub released: Vec<ReserveRelease>,
    pub failed: Vec<ReserveFailure>,
    /// Groups whose rows were all refunded or released by someone else before their transfer was made
    pub skipped_groups: usize,
}

impl SweepReport {
    pub fn total_released(&self) -> Cents {
        self.released.iter().map(|r| r.amount).sum()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

enum GroupOutcome {
    Released(ReserveRelease),
    Failed(ReserveFailure),
    Skipped,
}

pub struct SweeperApi<B, P> {
    db: B,
    provider: P,
    config: SettlementConfig,
}

impl<B, P> Debug for SweeperApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SweeperApi")
    }
}

impl<B, P> SweeperApi<B, P> {
    pub fn new(db: B, provider: P, config: SettlementConfig) -> Self {
        Self { db, provider, config }
    }
}

impl<B, P> SweeperApi<B, P>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    /// Releases every reserve that is due at `now`.
    ///
    /// Groups are processed concurrently, up to the configured parallelism. A failed transfer leaves its rows
    /// unreleased with the error recorded, so they are picked up again by the next sweep.
    pub async fn run_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, SettlementError> {
        let due = self
            .db
            .fetch_unreleased_reserves()
            .await?
            .into_iter()
            .filter(|r| r.is_reserve_eligible(now))
            .collect::<Vec<_>>();
        let mut report = SweepReport { eligible_rows: due.len(), ..Default::default() };
        if due.is_empty() {
            debug!("🕰️ No reserves are due for release");
            return Ok(report);
        }
        let groups = self.group_rows(due);
        debug!("🕰️ Releasing reserves for {} rows in {} groups", report.eligible_rows, groups.len());
        let outcomes = stream::iter(groups)
            .map(|(key, ids)| self.release_group(key, ids, now))
            .buffer_unordered(self.config.sweep_parallelism.max(1))
            .collect::<Vec<_>>()
            .await;
        for outcome in outcomes {
            match outcome? {
                GroupOutcome::Released(r) => report.released.push(r),
                GroupOutcome::Failed(f) => report.failed.push(f),
                GroupOutcome::Skipped => report.skipped_groups += 1,
            }
        }
        info!(
            "🕰️ Reserve sweep complete. {} released in {} transfers, {} groups failed, {} skipped",
            report.total_released(),
            report.released.len(),
            report.failed.len(),
            report.skipped_groups
        );
        Ok(report)
    }

    fn group_rows(&self, rows: Vec<LedgerRow>) -> BTreeMap<ReserveGroupKey, Vec<i64>> {
        let mut groups = BTreeMap::<ReserveGroupKey, Vec<i64>>::new();
        for row in rows {
            let Some(destination) = row.destination else {
                warn!("🕰️ Ledger row #{} has a reserve due but no destination account. Skipping it.", row.id);
                continue;
            };
            let key = ReserveGroupKey { maker_id: row.maker_id, destination, currency: row.currency };
            groups.entry(key).or_default().push(row.id);
        }
        groups
    }

    async fn release_group(
        &self,
        group: ReserveGroupKey,
        ids: Vec<i64>,
        now: DateTime<Utc>,
    ) -> Result<GroupOutcome, SettlementError> {
        // A refund may have landed since the rows were selected
        let rows = self
            .db
            .fetch_ledger_rows(&ids)
            .await?
            .into_iter()
            .filter(|r| r.is_reserve_eligible(now))
            .collect::<Vec<_>>();
        if rows.is_empty() {
            info!("🕰️ All reserves for maker #{} became ineligible before release", group.maker_id);
            return Ok(GroupOutcome::Skipped);
        }
        if rows.len() < ids.len() {
            info!(
                "🕰️ {} of {} reserve rows for maker #{} are no longer eligible and will not be released",
                ids.len() - rows.len(),
                ids.len(),
                group.maker_id
            );
        }
        let ids = rows.iter().map(|r| r.id).collect::<Vec<_>>();
        let amount = rows.iter().map(|r| r.reserve).sum::<Cents>();
        let request = TransferRequest {
            amount,
            currency: group.currency.clone(),
            destination: group.destination.clone(),
            transfer_group: None,
            metadata: maker_metadata(None, group.maker_id, &ids),
            idempotency_key: reserve_release_key(&ids),
        };
        match with_timeout(self.config.provider_timeout, self.provider.create_transfer(request)).await {
            Ok(receipt) => {
                let updated = self.db.mark_reserves_released(&ids, &receipt.transfer_id).await?;
                if updated < ids.len() as u64 {
                    warn!(
                        "🕰️ Reserve transfer {} was sent, but only {updated} of {} rows could be marked released. \
                         A refund may have raced the sweep.",
                        receipt.transfer_id,
                        ids.len()
                    );
                }
                debug!("🕰️ Released {amount} {} to maker #{}", group.currency, group.maker_id);
                Ok(GroupOutcome::Released(ReserveRelease {
                    group,
                    amount,
                    transfer_id: receipt.transfer_id,
                    ledger_row_ids: ids,
                }))
            },
            Err(e) => {
                warn!("🕰️ Reserve release of {amount} to maker #{} failed. {e}", group.maker_id);
                let error = e.to_string();
                self.db.record_ledger_error(&ids, &error, false).await?;
                Ok(GroupOutcome::Failed(ReserveFailure { group, amount, error, ledger_row_ids: ids }))
            },
        }
    }
}
