use chrono::{DateTime, Duration, TimeZone, Utc};
use split_payment_engine::{
    db_types::{Cents, LedgerStatus},
    helpers::reserve_release_key,
    LedgerManagement,
};
use support::{account_for, Marketplace};

mod support;

fn paid_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap()
}

#[tokio::test]
async fn reserves_are_released_exactly_when_the_window_closes() {
    let market = Marketplace::new().await;
    let order = market.standard_order("SPG-3001").await;
    market.checkout(&order).await;
    market.pay(&order, "pi_3001", paid_at()).await;
    let due = paid_at() + Duration::days(30);

    let early = market.sweeper().run_sweep(due - Duration::seconds(1)).await.unwrap();
    assert_eq!(early.eligible_rows, 0);
    assert!(early.released.is_empty());

    let report = market.sweeper().run_sweep(due).await.unwrap();
    assert_eq!(report.eligible_rows, 2);
    assert_eq!(report.released.len(), 2);
    assert!(report.is_clean());
    assert_eq!(report.total_released(), Cents::from(750));

    let ledger = market.db.fetch_ledger_for_order(order.id).await.unwrap();
    for row in &ledger {
        assert!(row.reserve_released);
        assert_eq!(row.status, LedgerStatus::Completed);
        assert!(row.release_transfer_id.is_some());
    }

    let rerun = market.sweeper().run_sweep(due + Duration::days(1)).await.unwrap();
    assert_eq!(rerun.eligible_rows, 0);
    assert_eq!(market.provider.executed_transfers().len(), 4);
    market.tear_down().await;
}

#[tokio::test]
async fn reserves_for_one_maker_are_combined_into_one_transfer() {
    let market = Marketplace::new().await;
    let first = market.standard_order("SPG-3002").await;
    let second = market.standard_order("SPG-3003").await;
    for (order, payment) in [(&first, "pi_3002"), (&second, "pi_3003")] {
        market.checkout(order).await;
        market.pay(order, payment, paid_at()).await;
    }
    let report = market.sweeper().run_sweep(paid_at() + Duration::days(30)).await.unwrap();
    assert_eq!(report.eligible_rows, 4);
    assert_eq!(report.released.len(), 2);

    let release_a = report.released.iter().find(|r| r.group.maker_id == market.maker_a.id).unwrap();
    assert_eq!(release_a.amount, Cents::from(1000));
    assert_eq!(release_a.group.destination, account_for(&market.maker_a));
    assert_eq!(release_a.ledger_row_ids.len(), 2);
    let transfer = market
        .provider
        .executed_transfers()
        .into_iter()
        .find(|t| t.transfer_group.is_none() && t.destination == account_for(&market.maker_a))
        .unwrap();
    assert_eq!(transfer.idempotency_key, reserve_release_key(&release_a.ledger_row_ids));
    assert_eq!(transfer.amount, Cents::from(1000));
    assert_eq!(transfer.currency, "eur");
    market.tear_down().await;
}

#[tokio::test]
async fn failed_releases_are_picked_up_by_the_next_sweep() {
    let market = Marketplace::new().await;
    let order = market.standard_order("SPG-3004").await;
    market.checkout(&order).await;
    market.pay(&order, "pi_3004", paid_at()).await;
    let account_a = account_for(&market.maker_a);
    market.provider.fail_transfers_to(&account_a);
    let due = paid_at() + Duration::days(30);

    let report = market.sweeper().run_sweep(due).await.unwrap();
    assert_eq!(report.released.len(), 1);
    assert_eq!(report.failed.len(), 1);
    let failed_ids = report.failed[0].ledger_row_ids.clone();
    let row = &market.db.fetch_ledger_rows(&failed_ids).await.unwrap()[0];
    assert!(!row.reserve_released);
    assert_eq!(row.status, LedgerStatus::ImmediateSent);
    assert!(row.error.is_some());

    market.provider.restore_transfers_to(&account_a);
    let retry = market.sweeper().run_sweep(due + Duration::hours(1)).await.unwrap();
    assert_eq!(retry.released.len(), 1);
    assert_eq!(retry.released[0].ledger_row_ids, failed_ids);
    let row = &market.db.fetch_ledger_rows(&failed_ids).await.unwrap()[0];
    assert!(row.reserve_released);
    assert!(row.error.is_none());
    market.tear_down().await;
}

#[tokio::test]
async fn reserve_waits_for_the_immediate_payout() {
    let market = Marketplace::new().await;
    let order = market.standard_order("SPG-3005").await;
    market.checkout(&order).await;
    market.provider.fail_transfers_to(&account_for(&market.maker_b));
    market.pay(&order, "pi_3005", paid_at()).await;
    let due = paid_at() + Duration::days(30);

    let report = market.sweeper().run_sweep(due).await.unwrap();
    assert_eq!(report.eligible_rows, 1);
    assert_eq!(report.released[0].group.maker_id, market.maker_a.id);

    market.provider.restore_transfers_to(&account_for(&market.maker_b));
    market.disburser().retry_failed(order.id).await.unwrap();
    let report = market.sweeper().run_sweep(due).await.unwrap();
    assert_eq!(report.eligible_rows, 1);
    assert_eq!(report.released[0].group.maker_id, market.maker_b.id);
    assert_eq!(report.total_released(), Cents::from(250));
    market.tear_down().await;
}

#[tokio::test]
async fn empty_sweep() {
    let market = Marketplace::new().await;
    let report = market.sweeper().run_sweep(Utc::now()).await.unwrap();
    assert_eq!(report.eligible_rows, 0);
    assert!(report.is_clean());
    assert_eq!(report.skipped_groups, 0);
    market.tear_down().await;
}
