use chrono::Duration;
use cucumber::{given, then, when};
use log::*;
use split_payment_engine::{
    db_types::{Cents, LedgerStatus, NewLineItem, NewOrder, OrderStatus},
    LedgerManagement,
    OrderManagement,
};

use crate::{
    cucumber::{world::parse_amount, SettlementWorld},
    support::{account_for, Marketplace, BUYER},
};

#[given("a marketplace with makers Ann and Ben")]
async fn marketplace(world: &mut SettlementWorld) {
    world.market = Some(Marketplace::new().await);
}

#[given(expr = "an order {string} with {word} from Ann and {word} from Ben")]
async fn two_maker_order(world: &mut SettlementWorld, number: String, ann: String, ben: String) {
    let (ann_id, ben_id) = (world.maker("Ann").id, world.maker("Ben").id);
    let order = NewOrder::new(number.as_str(), BUYER, "eur")
        .with_item(NewLineItem::new(ann_id, "ann-1", "Stoneware bowl", 1, parse_amount(&ann)))
        .with_item(NewLineItem::new(ben_id, "ben-1", "Linocut print", 1, parse_amount(&ben)));
    let order = world.market().db.insert_order(order).await.expect("Error inserting order");
    world.orders.insert(number, order);
}

#[when(expr = "the buyer checks out order {string}")]
async fn checkout(world: &mut SettlementWorld, number: String) {
    let order = world.order(&number).clone();
    let redirect = world.market().checkout(&order).await;
    debug!("Checkout session {} created for {number}", redirect.session_id);
}

#[when(expr = "payment {string} for order {string} succeeds")]
async fn payment_succeeds(world: &mut SettlementWorld, payment_id: String, number: String) {
    let order = world.order(&number).clone();
    let outcome = world.market().pay(&order, &payment_id, world.paid_at()).await;
    world.last_outcome = Some(outcome);
}

#[when(expr = "payment {string} is refunded")]
async fn payment_refunded(world: &mut SettlementWorld, payment_id: String) {
    let outcome = world.market().refund(&payment_id, Cents::default()).await;
    world.last_outcome = Some(outcome);
}

#[when(expr = "the reserve sweep runs {int} days after payment")]
async fn run_sweep(world: &mut SettlementWorld, days: i64) {
    let now = world.paid_at() + Duration::days(days);
    let report = world.market().sweeper().run_sweep(now).await.expect("Sweep failed");
    world.last_sweep = Some(report);
}

#[then(expr = "{word} is paid {word} immediately")]
async fn paid_immediately(world: &mut SettlementWorld, maker: String, amount: String) {
    let destination = account_for(world.maker(&maker));
    let paid = world
        .market()
        .provider
        .executed_transfers()
        .into_iter()
        .filter(|t| t.destination == destination && t.transfer_group.is_some())
        .map(|t| t.amount)
        .sum::<Cents>();
    assert_eq!(paid, parse_amount(&amount), "{maker} was paid {paid}");
}

#[then(expr = "the platform keeps {word} in fees for order {string}")]
async fn platform_fees(world: &mut SettlementWorld, amount: String, number: String) {
    let rows = world.market().db.fetch_ledger_for_order(world.order(&number).id).await.unwrap();
    let fees = rows.iter().map(|r| r.platform_fee).sum::<Cents>();
    assert_eq!(fees, parse_amount(&amount));
}

#[then(expr = "{word} is held in reserve for order {string}")]
async fn held_in_reserve(world: &mut SettlementWorld, amount: String, number: String) {
    let rows = world.market().db.fetch_ledger_for_order(world.order(&number).id).await.unwrap();
    let reserve = rows.iter().filter(|r| !r.reserve_released).map(|r| r.reserve).sum::<Cents>();
    assert_eq!(reserve, parse_amount(&amount));
    assert!(rows.iter().all(|r| r.is_balanced()));
}

#[then("no reserves are released")]
async fn no_reserves(world: &mut SettlementWorld) {
    let report = world.last_sweep.as_ref().expect("No sweep has run");
    assert!(report.released.is_empty(), "{} reserve transfers were made", report.released.len());
}

#[then(expr = "{int} reserve transfers totalling {word} are made")]
async fn reserve_transfers(world: &mut SettlementWorld, count: usize, amount: String) {
    let report = world.last_sweep.as_ref().expect("No sweep has run");
    assert_eq!(report.released.len(), count);
    assert_eq!(report.total_released(), parse_amount(&amount));
}

#[then(expr = "order {string} is {word}")]
async fn order_status(world: &mut SettlementWorld, number: String, status: String) {
    let order = world.market().order(world.order(&number).id).await;
    assert_eq!(order.status, status.parse::<OrderStatus>().expect("Unknown status"));
}

#[then(expr = "every ledger row of order {string} is {word}")]
async fn ledger_status(world: &mut SettlementWorld, number: String, status: String) {
    let rows = world.market().db.fetch_ledger_for_order(world.order(&number).id).await.unwrap();
    let expected = match status.as_str() {
        "refunded" => LedgerStatus::Refunded,
        "completed" => LedgerStatus::Completed,
        "immediate_sent" => LedgerStatus::ImmediateSent,
        _ => panic!("Unknown ledger status {status}"),
    };
    assert!(rows.iter().all(|r| r.status == expected));
}
