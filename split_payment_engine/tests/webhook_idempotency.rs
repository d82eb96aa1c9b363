use chrono::{Duration, Utc};
use split_payment_engine::{
    db_types::{CapabilityFlags, Cents, DisbursementState, LedgerStatus, OrderStatus, PaymentStatus, ProviderKind},
    LedgerManagement,
    OrderManagement,
    PayoutAccountManagement,
    ProviderEvent,
    ProviderEventKind,
    ReconcileOutcome,
    SettlementDatabase,
};
use support::{account_for, payment_event, Interference, Marketplace};

mod support;

#[tokio::test]
async fn redelivered_events_are_processed_once() {
    let market = Marketplace::new().await;
    let order = market.standard_order("SPG-2001").await;
    market.checkout(&order).await;
    let reconciler = market.reconciler();
    let event = payment_event("evt_2001", order.id, "pi_2001", Utc::now());

    let first = reconciler.handle_event(event.clone()).await.unwrap();
    assert!(first.is_applied());
    let second = reconciler.handle_event(event).await.unwrap();
    assert!(matches!(second, ReconcileOutcome::AlreadyProcessed));
    assert!(second.notifications().is_empty());
    assert_eq!(market.provider.executed_transfers().len(), 2);
    assert_eq!(market.provider.transfer_calls().len(), 2);
    market.tear_down().await;
}

#[tokio::test]
async fn the_same_payment_under_a_new_event_id_does_not_pay_twice() {
    let market = Marketplace::new().await;
    let order = market.standard_order("SPG-2002").await;
    market.checkout(&order).await;
    let reconciler = market.reconciler();

    let first = reconciler.handle_event(payment_event("evt_a", order.id, "pi_2002", Utc::now())).await.unwrap();
    assert!(first.is_applied());
    let second = reconciler.handle_event(payment_event("evt_b", order.id, "pi_2002", Utc::now())).await.unwrap();
    assert!(matches!(second, ReconcileOutcome::NotApplicable(_)));
    assert_eq!(market.provider.transfer_calls().len(), 2);
    assert_eq!(market.db.fetch_ledger_for_order(order.id).await.unwrap().len(), 2);
    market.tear_down().await;
}

#[tokio::test]
async fn concurrent_deliveries_pay_each_maker_once() {
    let market = Marketplace::new().await;
    let order = market.standard_order("SPG-2003").await;
    market.checkout(&order).await;
    let r1 = market.reconciler();
    let r2 = market.reconciler();
    let paid_at = Utc::now();
    let (a, b) = tokio::join!(
        r1.reconcile(payment_event("evt_c1", order.id, "pi_2003", paid_at)),
        r2.reconcile(payment_event("evt_c2", order.id, "pi_2003", paid_at)),
    );
    // A delivery that loses a write race may fail outright; the provider would redeliver it.
    assert!(a.is_ok() || b.is_ok());
    let executed = market.provider.executed_transfers();
    assert_eq!(executed.len(), 2);
    assert_ne!(executed[0].destination, executed[1].destination);
    assert_eq!(market.db.fetch_ledger_for_order(order.id).await.unwrap().len(), 2);
    market.tear_down().await;
}

#[tokio::test]
async fn late_payment_for_an_expired_checkout_is_not_applied() {
    let market = Marketplace::new().await;
    let order = market.standard_order("SPG-2004").await;
    let redirect = market.checkout(&order).await;
    let reconciler = market.reconciler();
    let kind = ProviderEventKind::SessionExpired { order_id: None, session_id: Some(redirect.session_id.clone()) };
    let expired = ProviderEvent::new(ProviderKind::Stripe, "evt_exp", "checkout.session.expired", kind);
    assert!(reconciler.handle_event(expired).await.unwrap().is_applied());
    let order = market.order(order.id).await;
    assert_eq!(order.status, OrderStatus::PaymentFailed);
    assert_eq!(order.payment_status, PaymentStatus::Failed);

    let late = reconciler.handle_event(payment_event("evt_late", order.id, "pi_2004", Utc::now())).await.unwrap();
    assert!(matches!(late, ReconcileOutcome::NotApplicable(_)));
    assert!(market.provider.transfer_calls().is_empty());
    assert_eq!(market.order(order.id).await.status, OrderStatus::PaymentFailed);
    market.tear_down().await;
}

#[tokio::test]
async fn expiry_after_payment_changes_nothing() {
    let market = Marketplace::new().await;
    let order = market.standard_order("SPG-2005").await;
    market.checkout(&order).await;
    market.pay(&order, "pi_2005", Utc::now()).await;
    let kind = ProviderEventKind::SessionExpired { order_id: Some(order.id), session_id: None };
    let expired = ProviderEvent::new(ProviderKind::Stripe, "evt_exp2", "checkout.session.expired", kind);
    let outcome = market.reconciler().handle_event(expired).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::NotApplicable(_)));
    assert_eq!(market.order(order.id).await.status, OrderStatus::Processing);
    market.tear_down().await;
}

#[tokio::test]
async fn refunds_take_precedence_over_unsettled_payouts() {
    let market = Marketplace::new().await;
    let order = market.standard_order("SPG-2006").await;
    market.checkout(&order).await;
    market.provider.fail_transfers_to(&account_for(&market.maker_b));
    market.pay(&order, "pi_2006", Utc::now()).await;

    let outcome = market.refund("pi_2006", Cents::from_major(150)).await;
    assert!(outcome.is_applied());
    let refunded = market.order(order.id).await;
    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    let linkage = market.db.fetch_payment_linkage(order.id).await.unwrap();
    assert_eq!(linkage.unwrap().refund_amount, Some(Cents::from_major(150)));
    let ledger = market.db.fetch_ledger_for_order(order.id).await.unwrap();
    assert!(ledger.iter().all(|r| r.status == LedgerStatus::Refunded));

    // The failed payout is never retried, and the reserve is never released
    market.provider.restore_transfers_to(&account_for(&market.maker_b));
    assert!(market.disburser().retry_failed(order.id).await.is_err());
    let report = market.sweeper().run_sweep(Utc::now() + chrono::Duration::days(31)).await.unwrap();
    assert_eq!(report.eligible_rows, 0);
    assert_eq!(market.provider.executed_transfers().len(), 1);

    let again = market.refund("pi_2006", Cents::from_major(150)).await;
    assert!(matches!(again, ReconcileOutcome::AlreadyProcessed));
    market.tear_down().await;
}

#[tokio::test]
async fn refund_for_an_unknown_payment_does_not_apply() {
    let market = Marketplace::new().await;
    let outcome = market.refund("pi_nobody", Cents::from(100)).await;
    assert!(matches!(outcome, ReconcileOutcome::NotApplicable(_)));
    market.tear_down().await;
}

#[tokio::test]
async fn account_updates_and_unknown_events() {
    let market = Marketplace::new().await;
    let reconciler = market.reconciler();
    let account_id = account_for(&market.maker_a);
    let restricted = CapabilityFlags { charges_enabled: true, payouts_enabled: false, details_submitted: true };
    let update = |event_id: &str, flags| {
        let kind = ProviderEventKind::AccountUpdated { account_id: account_id.clone(), flags };
        ProviderEvent::new(ProviderKind::Stripe, event_id, "account.updated", kind)
    };

    assert!(reconciler.handle_event(update("evt_acc1", restricted)).await.unwrap().is_applied());
    let account = market.db.fetch_payout_account(&account_id).await.unwrap().unwrap();
    assert_eq!(account.status.to_string(), "restricted");
    let unchanged = reconciler.handle_event(update("evt_acc2", restricted)).await.unwrap();
    assert!(matches!(unchanged, ReconcileOutcome::NotApplicable(_)));

    let unknown = ProviderEvent::new(ProviderKind::Stripe, "evt_x", "invoice.created", ProviderEventKind::Unrecognized);
    assert!(matches!(reconciler.handle_event(unknown).await.unwrap(), ReconcileOutcome::Ignored(_)));
    market.tear_down().await;
}

#[tokio::test]
async fn refund_during_disbursement_stops_the_remaining_payouts() {
    let market = Marketplace::new().await;
    let order = market.standard_order("SPG-2010").await;
    market.checkout(&order).await;
    let refund = Interference::Refund { payment_id: "pi_2010".into(), amount: order.total_price };
    let provider = market.interfering(&market.db, refund);
    let event = payment_event("evt_2010", order.id, "pi_2010", Utc::now());

    let outcome = market.reconciler_with(provider).handle_event(event).await.unwrap();
    let ReconcileOutcome::Applied(applied) = outcome else { panic!("Payment was not applied") };
    let report = applied.disbursement.unwrap();
    // Maker A's transfer was already on its way when the refund landed. Maker B is never paid.
    assert_eq!(report.succeeded_count(), 0);
    assert_eq!(report.total_sent(), Cents::from(8500));
    let executed = market.provider.executed_transfers();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].destination, account_for(&market.maker_a));

    let refunded = market.order(order.id).await;
    assert_eq!(refunded.status, OrderStatus::Refunded);
    assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
    let ledger = market.db.fetch_ledger_for_order(order.id).await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().all(|r| r.status == LedgerStatus::Refunded));
    let row_a = ledger.iter().find(|r| r.maker_id == market.maker_a.id).unwrap();
    assert!(row_a.immediate_transfer_id.is_some());
    let row_b = ledger.iter().find(|r| r.maker_id == market.maker_b.id).unwrap();
    assert!(row_b.immediate_transfer_id.is_none());

    let sweep = market.sweeper().run_sweep(Utc::now() + Duration::days(60)).await.unwrap();
    assert_eq!(sweep.eligible_rows, 0);
    assert!(market.disburser().retry_failed(order.id).await.is_err());
    market.tear_down().await;
}

#[tokio::test]
async fn refund_before_the_ledger_is_written_leaves_nothing_to_pay() {
    let market = Marketplace::new().await;
    let order = market.standard_order("SPG-2011").await;
    market.checkout(&order).await;
    market.db.record_payment_success(order.id, "pi_2011", Utc::now()).await.unwrap();
    // The disbursement was claimed, then the process stopped before any ledger row was written
    assert!(market.db.claim_disbursement(order.id).await.unwrap().is_some());
    let refund = market.refund("pi_2011", order.total_price).await;
    assert!(refund.is_applied());

    let report = market.disburser().resume_disbursement(order.id).await.unwrap();
    assert!(report.payouts.is_empty());
    let ledger = market.db.fetch_ledger_for_order(order.id).await.unwrap();
    assert_eq!(ledger.len(), 2);
    assert!(ledger.iter().all(|r| r.status == LedgerStatus::Refunded));
    assert!(market.provider.transfer_calls().is_empty());
    let linkage = market.db.fetch_payment_linkage(order.id).await.unwrap().unwrap();
    assert_eq!(linkage.disbursement, DisbursementState::Completed);

    let sweep = market.sweeper().run_sweep(Utc::now() + Duration::days(60)).await.unwrap();
    assert_eq!(sweep.eligible_rows, 0);
    market.tear_down().await;
}
