use std::time::Duration;

use chrono::Utc;
use log::*;
use split_payment_engine::{SettlementConfig, SqliteDatabase, SweepReport, SweeperApi};
use tokio::task::JoinHandle;

use crate::integrations::ProviderGateway;

/// Starts the reserve sweep worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// The first sweep runs immediately, so reserves that came due while the server was down are released on startup.
pub fn start_sweep_worker(
    db: SqliteDatabase,
    provider: ProviderGateway,
    config: SettlementConfig,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let api = SweeperApi::new(db, provider, config);
        info!("🕰️ Reserve sweep worker started. Sweeping every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            info!("🕰️ Running reserve sweep job");
            match api.run_sweep(Utc::now()).await {
                Ok(report) => log_report(&report),
                Err(e) => {
                    error!("🕰️ Error running reserve sweep job: {e}");
                },
            }
        }
    })
}

fn log_report(report: &SweepReport) {
    info!(
        "🕰️ {} reserve transfers sent for {} eligible ledger rows. Total released: {}",
        report.released.len(),
        report.eligible_rows,
        report.total_released()
    );
    for release in &report.released {
        debug!(
            "🕰️ Released {} to maker {} ({}). Transfer {}. Rows: {:?}",
            release.amount, release.group.maker_id, release.group.destination, release.transfer_id, release.ledger_row_ids
        );
    }
    if report.skipped_groups > 0 {
        debug!("🕰️ {} reserve groups had nothing left to release", report.skipped_groups);
    }
    if !report.is_clean() {
        warn!("🕰️ {} reserve groups failed. They will be retried on the next sweep.", report.failed.len());
        for failure in &report.failed {
            warn!(
                "🕰️ Could not release {} to maker {}. {}. Rows: {:?}",
                failure.amount, failure.group.maker_id, failure.error, failure.ledger_row_ids
            );
        }
    }
}
