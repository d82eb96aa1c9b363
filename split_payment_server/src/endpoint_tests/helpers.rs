use actix_web::{
    body::MessageBody,
    http::StatusCode,
    test,
    test::TestRequest,
    web::ServiceConfig,
    App,
};
use log::debug;
use split_payment_engine::{
    db_types::{BuyerProfile, CapabilityFlags, Cents, Maker, NewLineItem, NewMaker, NewOrder, Order},
    test_utils::prepare_env::fresh_database,
    OrderManagement,
    PayoutAccountManagement,
    SqliteDatabase,
};

use crate::helpers::{calculate_hmac, calculate_stripe_signature};

pub const BUYER: &str = "buyer-alice";
pub const MAKER: &str = "maker-ann";
pub const NEW_MAKER: &str = "maker-ben";
pub const MAKER_ACCOUNT: &str = "acct_ann";
pub const STRIPE_SECRET: &str = "whsec_endpoint_tests";
pub const BANK_SECRET: &str = "bank_endpoint_tests";

pub const ACTIVE: CapabilityFlags = CapabilityFlags { charges_enabled: true, payouts_enabled: true, details_submitted: true };

/// A database with one buyer, an onboarded maker, a maker without a payout account, and one unpaid order of 100.00
/// from the onboarded maker.
pub struct Marketplace {
    pub db: SqliteDatabase,
    pub maker: Maker,
    pub order: Order,
}

impl Marketplace {
    pub async fn new() -> Self {
        let db = fresh_database().await;
        let profile = BuyerProfile {
            user_id: BUYER.into(),
            full_name: Some("Alice Buyer".into()),
            email: Some("alice@example.com".into()),
        };
        db.upsert_buyer_profile(profile).await.expect("Error creating buyer");
        let maker = add_maker(&db, MAKER, "Ann's Pottery").await;
        db.insert_payout_account(maker.id, MAKER_ACCOUNT, ACTIVE).await.expect("Error adding payout account");
        add_maker(&db, NEW_MAKER, "Ben's Prints").await;
        let order = NewOrder::new("SPG-1001", BUYER, "eur").with_item(NewLineItem::new(
            maker.id,
            "vase-01",
            "Blue vase",
            1,
            Cents::from_major(100),
        ));
        let order = db.insert_order(order).await.expect("Error inserting order");
        Self { db, maker, order }
    }

    pub async fn fetch_order(&self) -> Order {
        self.db.fetch_order(self.order.id).await.expect("Error fetching order").expect("Order not found")
    }
}

async fn add_maker(db: &SqliteDatabase, user_id: &str, name: &str) -> Maker {
    let maker = NewMaker {
        user_id: user_id.into(),
        display_name: name.into(),
        email: format!("{user_id}@makers.example"),
        country: "NL".into(),
    };
    db.insert_maker(maker).await.expect("Error inserting maker")
}

/// Sends the request to an app built by `configure`, and returns the status and body. Errors raised by middleware
/// are returned the same way, as the status and message they would be rendered with.
pub async fn send_request<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let (_, res) = res.into_parts();
            let status = res.status();
            let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
            (status, body)
        },
        Err(e) => (e.as_response_error().status_code(), e.to_string()),
    }
}

pub fn user_request(method: TestRequest, user_id: &str) -> TestRequest {
    method.insert_header(("x-spg-user", user_id))
}

pub fn signed_stripe_request(path: &str, body: &str) -> TestRequest {
    let timestamp = chrono::Utc::now().timestamp();
    let sig = calculate_stripe_signature(STRIPE_SECRET, timestamp, body.as_bytes()).unwrap();
    TestRequest::post()
        .uri(path)
        .insert_header(("Stripe-Signature", format!("t={timestamp},v1={sig}")))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.to_string())
}

pub fn signed_bank_request(path: &str, body: &str) -> TestRequest {
    let sig = calculate_hmac(BANK_SECRET, body.as_bytes()).unwrap();
    TestRequest::post()
        .uri(path)
        .insert_header(("X-Bank-Signature", sig))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.to_string())
}
