use std::time::Duration;

use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use serde_json::{json, Value};
use spg_common::Secret;
use split_payment_engine::{
    db_types::{Cents, LedgerStatus, OrderStatus, ProviderKind},
    helpers::disbursement_key,
    traits::{CheckoutSession, TransferReceipt},
    CheckoutApi,
    CheckoutRequest,
    LedgerManagement,
    ReconcilerApi,
    SettlementConfig,
    SqliteDatabase,
};

use super::{
    helpers::{
        send_request,
        signed_bank_request,
        signed_stripe_request,
        Marketplace,
        BANK_SECRET,
        BUYER,
        MAKER_ACCOUNT,
        STRIPE_SECRET,
    },
    mocks::{MockGateway, SharedGateway},
};
use crate::{
    data_objects::JsonResponse,
    helpers::calculate_stripe_signature,
    middleware::SignatureMiddlewareFactory,
    routes::{BankWebhookRoute, StripeWebhookRoute},
};

fn configure(db: SqliteDatabase, gateway: SharedGateway) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = ReconcilerApi::new(db, gateway, SettlementConfig::default(), Default::default());
        let stripe_scope = web::scope("/stripe")
            .wrap(SignatureMiddlewareFactory::stripe(
                Secret::new(STRIPE_SECRET.to_string()),
                Duration::from_secs(300),
                true,
            ))
            .service(StripeWebhookRoute::<SqliteDatabase, SharedGateway>::new());
        let bank_scope = web::scope("/bank")
            .wrap(SignatureMiddlewareFactory::bank(Secret::new(BANK_SECRET.to_string()), true))
            .service(BankWebhookRoute::<SqliteDatabase, SharedGateway>::new());
        cfg.app_data(web::Data::new(api)).service(web::scope("/webhook").service(stripe_scope).service(bank_scope));
    }
}

fn idle_gateway() -> SharedGateway {
    SharedGateway::new(MockGateway::new())
}

fn session_completed(event_id: &str, session_id: &str, order_id: i64) -> String {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": chrono::Utc::now().timestamp(),
        "livemode": false,
        "data": {
            "object": {
                "id": session_id,
                "payment_intent": "pi_flow",
                "payment_status": "paid",
                "metadata": { "order_id": order_id.to_string(), "order_number": "SPG-1001" }
            }
        }
    })
    .to_string()
}

fn message(body: &str) -> String {
    let response: JsonResponse = serde_json::from_str(body).unwrap();
    assert!(response.success);
    response.message
}

#[actix_web::test]
async fn unsigned_webhooks_are_rejected() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let body = session_completed("evt_unsigned", "cs_1", market.order.id);
    let req = TestRequest::post().uri("/webhook/stripe").set_payload(body.clone());
    let (status, msg) = send_request(req, configure(market.db.clone(), idle_gateway())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(msg, "No signature found.");

    let timestamp = chrono::Utc::now().timestamp();
    let forged = calculate_stripe_signature("whsec_someone_else", timestamp, body.as_bytes()).unwrap();
    let req = TestRequest::post()
        .uri("/webhook/stripe")
        .insert_header(("Stripe-Signature", format!("t={timestamp},v1={forged}")))
        .set_payload(body);
    let (status, msg) = send_request(req, configure(market.db.clone(), idle_gateway())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(msg, "Invalid signature.");
    assert_eq!(market.fetch_order().await.status, OrderStatus::Pending);
}

#[actix_web::test]
async fn malformed_payloads() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let req = signed_stripe_request("/webhook/stripe", "{not json");
    let (status, _) = send_request(req, configure(market.db.clone(), idle_gateway())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    // A known event type without the fields it needs
    let body = json!({"id": "evt_bad", "type": "charge.refunded", "data": {"object": {"amount": 10}}}).to_string();
    let req = signed_stripe_request("/webhook/stripe", &body);
    let (status, _) = send_request(req, configure(market.db.clone(), idle_gateway())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body = json!({
        "id": "bev_bad",
        "type": "payment.refunded",
        "created_at": "2024-06-01T10:00:00Z",
        "data": {"payment_id": "bp_1"}
    })
    .to_string();
    let req = signed_bank_request("/webhook/bank", &body);
    let (status, _) = send_request(req, configure(market.db.clone(), idle_gateway())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn unrecognized_events_are_acknowledged() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let body = json!({"id": "evt_inv", "type": "invoice.paid", "data": {"object": {"id": "in_1"}}}).to_string();
    let req = signed_stripe_request("/webhook/stripe", &body);
    let (status, body) = send_request(req, configure(market.db.clone(), idle_gateway())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&body), "Event ignored. invoice.paid events are not handled");

    let body = json!({
        "id": "bev_pending",
        "type": "payment.pending",
        "created_at": "2024-06-01T10:00:00Z",
        "data": {"payment_id": "bp_1"}
    })
    .to_string();
    let req = signed_bank_request("/webhook/bank", &body);
    let (status, body) = send_request(req, configure(market.db.clone(), idle_gateway())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&body), "Event ignored. payment.pending events are not handled");
}

#[actix_web::test]
async fn payment_for_unknown_order_is_acknowledged() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let body = session_completed("evt_orphan", "cs_orphan", 4242);
    let req = signed_stripe_request("/webhook/stripe", &body);
    let (status, body) = send_request(req, configure(market.db.clone(), idle_gateway())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(message(&body).starts_with("Event not applicable. No order matches payment pi_flow"));
}

#[actix_web::test]
async fn stripe_payment_pays_the_maker_once() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let order_id = market.order.id;
    let key = disbursement_key(order_id, market.maker.id);
    let mut gateway = MockGateway::new();
    gateway.expect_create_checkout_session().times(1).returning(|_, _| {
        Ok(CheckoutSession { session_id: "cs_flow".into(), redirect_url: "https://pay.example/cs_flow".into() })
    });
    gateway
        .expect_create_transfer()
        .withf(move |req| {
            req.destination == MAKER_ACCOUNT && req.amount == Cents::from_major(85) && req.idempotency_key == key
        })
        .times(1)
        .returning(|_| Ok(TransferReceipt { transfer_id: "tr_flow".into() }));
    let gateway = SharedGateway::new(gateway);
    let checkout = CheckoutApi::new(market.db.clone(), gateway.clone(), SettlementConfig::default());
    let request = CheckoutRequest {
        order_id,
        provider: ProviderKind::Stripe,
        success_url: "https://shop.example/thanks".into(),
        cancel_url: "https://shop.example/cart".into(),
    };
    checkout.create_checkout_session(BUYER, request).await.expect("Checkout failed");

    let body = session_completed("evt_paid", "cs_flow", order_id);
    let req = signed_stripe_request("/webhook/stripe", &body);
    let (status, response) = send_request(req, configure(market.db.clone(), gateway.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&response), format!("Order #{order_id} is paid"));
    assert_eq!(market.fetch_order().await.status, OrderStatus::Processing);
    let ledger = market.db.fetch_ledger_for_order(order_id).await.unwrap();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0].status, LedgerStatus::ImmediateSent);
    assert_eq!(ledger[0].gross, Cents::from_major(100));
    assert_eq!(ledger[0].platform_fee, Cents::from_major(10));
    assert_eq!(ledger[0].reserve, Cents::from_major(5));
    assert_eq!(ledger[0].immediate_transfer_id.as_deref(), Some("tr_flow"));

    // Redelivery of the same event
    let req = signed_stripe_request("/webhook/stripe", &body);
    let (status, response) = send_request(req, configure(market.db.clone(), gateway.clone())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message(&response), "Event already processed.");
    // A different event for the same payment
    let body = session_completed("evt_paid_again", "cs_flow", order_id);
    let req = signed_stripe_request("/webhook/stripe", &body);
    let (status, response) = send_request(req, configure(market.db.clone(), gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(message(&response).starts_with("Event not applicable."));
    assert_eq!(market.db.fetch_ledger_for_order(order_id).await.unwrap().len(), 1);
}
