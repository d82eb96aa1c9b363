use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use serde_json::Value;
use split_payment_engine::{
    traits::{ConnectedAccount, ProviderError},
    PayoutAccountApi,
    SettlementConfig,
    SqliteDatabase,
};

use super::{
    helpers::{send_request, user_request, Marketplace, ACTIVE, BUYER, MAKER, MAKER_ACCOUNT, NEW_MAKER},
    mocks::{MockGateway, SharedGateway},
};
use crate::routes::{LoginLinkRoute, OnboardRoute, PayoutAccountRoute};

fn configure(db: SqliteDatabase, gateway: MockGateway) -> impl FnOnce(&mut ServiceConfig) {
    move |cfg| {
        let api = PayoutAccountApi::new(db, SharedGateway::new(gateway), SettlementConfig::default());
        cfg.app_data(web::Data::new(api))
            .service(OnboardRoute::<SqliteDatabase, SharedGateway>::new())
            .service(PayoutAccountRoute::<SqliteDatabase, SharedGateway>::new())
            .service(LoginLinkRoute::<SqliteDatabase, SharedGateway>::new());
    }
}

#[actix_web::test]
async fn onboard_new_maker() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_connected_account()
        .withf(|req| req.country == "NL" && req.email == "maker-ben@makers.example")
        .times(1)
        .returning(|_| Ok(ConnectedAccount { account_id: "acct_ben".into(), flags: Default::default() }));
    let req = user_request(TestRequest::post(), NEW_MAKER).uri("/payouts/onboard");
    let (status, body) = send_request(req, configure(market.db.clone(), gateway)).await;
    assert_eq!(status, StatusCode::CREATED);
    let account: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(account["account_id"], "acct_ben");
    assert_eq!(account["payouts_enabled"], false);

    // Onboarding again returns the same account without calling the provider
    let req = user_request(TestRequest::post(), NEW_MAKER).uri("/payouts/onboard");
    let (status, body) = send_request(req, configure(market.db.clone(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::OK);
    let account: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(account["account_id"], "acct_ben");
}

#[actix_web::test]
async fn buyers_cannot_onboard() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let req = user_request(TestRequest::post(), BUYER).uri("/payouts/onboard");
    let (status, _) = send_request(req, configure(market.db.clone(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn onboarding_when_the_provider_fails() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let mut gateway = MockGateway::new();
    gateway.expect_create_connected_account().times(1).returning(|_| Err(ProviderError::Timeout));
    let req = user_request(TestRequest::post(), NEW_MAKER).uri("/payouts/onboard");
    let (status, _) = send_request(req, configure(market.db.clone(), gateway)).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let req = user_request(TestRequest::get(), NEW_MAKER).uri("/payouts/account");
    let (status, _) = send_request(req, configure(market.db.clone(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn fetch_payout_account() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let req = user_request(TestRequest::get(), MAKER).uri("/payouts/account");
    let (status, body) = send_request(req, configure(market.db.clone(), MockGateway::new())).await;
    assert_eq!(status, StatusCode::OK);
    let account: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(account["account_id"], MAKER_ACCOUNT);
    assert_eq!(account["maker_id"], market.maker.id);
    assert_eq!(account["charges_enabled"], ACTIVE.charges_enabled);
    assert_eq!(account["status"], "active");
}

#[actix_web::test]
async fn login_link() {
    let _ = env_logger::try_init().ok();
    let market = Marketplace::new().await;
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_login_link()
        .withf(|account_id| account_id == MAKER_ACCOUNT)
        .times(1)
        .returning(|_| Ok("https://connect.example/login/abc".into()));
    let req = user_request(TestRequest::post(), MAKER).uri("/payouts/login_link");
    let (status, body) = send_request(req, configure(market.db.clone(), gateway)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"url":"https://connect.example/login/abc"}"#);
}
