use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use serde_json::{json, Value};
use split_payment_engine::{
    db_types::{OrderStatus, ProviderKind},
    traits::{CheckoutSession, ProviderError},
    CheckoutApi,
    SettlementConfig,
    SqliteDatabase,
};

use super::{
    helpers::{send_request, user_request, Marketplace, BUYER, MAKER},
    mocks::{MockGateway, SharedGateway},
};
use crate::routes::CheckoutRoute;

fn checkout_body(order_id: i64, provider: &str) -> Value {
    json!({
        "order_id": order_id,
        "provider": provider,
        "success_url": "https://shop.example/thanks",
        "cancel_url": "https://shop.example/cart"
    })
}

fn configure(db: SqliteDatabase, gateway: MockGateway) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = CheckoutApi::new(db, SharedGateway::new(gateway), SettlementConfig::default());
        cfg.app_data(web::Data::new(api)).service(CheckoutRoute::<SqliteDatabase, SharedGateway>::new());
    }
}

#[actix_web::test]
async fn checkout_requires_a_user() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let req = TestRequest::post().uri("/checkout").set_json(checkout_body(market.order.id, "stripe"));
    let (status, body) = send_request(req, configure(market.db.clone(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"No authenticated user was found in the request."}"#);
}

#[actix_web::test]
async fn checkout_with_stripe() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let mut gateway = MockGateway::new();
    let expected_amount = market.order.total_price;
    gateway
        .expect_create_checkout_session()
        .withf(move |provider, req| {
            *provider == ProviderKind::Stripe &&
                req.amount == expected_amount &&
                req.customer_email.as_deref() == Some("alice@example.com")
        })
        .times(1)
        .returning(|_, _| {
            Ok(CheckoutSession { session_id: "cs_test_1".into(), redirect_url: "https://pay.example/cs_test_1".into() })
        });
    let req = user_request(TestRequest::post(), BUYER).uri("/checkout").set_json(checkout_body(market.order.id, "stripe"));
    let (status, body) = send_request(req, configure(market.db.clone(), gateway)).await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(body["session_id"], "cs_test_1");
    assert_eq!(body["redirect_url"], "https://pay.example/cs_test_1");
    assert_eq!(body["order_id"], market.order.id);
    assert_eq!(market.fetch_order().await.status, OrderStatus::AwaitingPayment);
}

#[actix_web::test]
async fn checkout_someone_elses_order() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let req = user_request(TestRequest::post(), MAKER).uri("/checkout").set_json(checkout_body(market.order.id, "stripe"));
    let (status, _) = send_request(req, configure(market.db.clone(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(market.fetch_order().await.status, OrderStatus::Pending);
}

#[actix_web::test]
async fn checkout_unknown_order() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let req = user_request(TestRequest::post(), BUYER).uri("/checkout").set_json(checkout_body(9999, "stripe"));
    let (status, _) = send_request(req, configure(market.db.clone(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn checkout_with_unconfigured_provider() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_checkout_session()
        .times(1)
        .returning(|_, _| Err(ProviderError::NotConfigured(ProviderKind::BankTransfer)));
    let req =
        user_request(TestRequest::post(), BUYER).uri("/checkout").set_json(checkout_body(market.order.id, "bank_transfer"));
    let (status, body) = send_request(req, configure(market.db.clone(), gateway)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body,
        r#"{"error":"Payments with bank_transfer are not yet available. Please try another method."}"#
    );
    assert_eq!(market.fetch_order().await.status, OrderStatus::Pending);
}

#[actix_web::test]
async fn checkout_with_bad_return_url() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let mut body = checkout_body(market.order.id, "stripe");
    body["success_url"] = json!("/thanks");
    let req = user_request(TestRequest::post(), BUYER).uri("/checkout").set_json(body);
    let (status, _) = send_request(req, configure(market.db.clone(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
