#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use log::*;
use split_payment_engine::{
    db_types::{BuyerProfile, CapabilityFlags, Cents, Maker, NewLineItem, NewMaker, NewOrder, Order, ProviderKind},
    test_utils::{prepare_env::fresh_database, MockProvider},
    traits::{
        CheckoutSession,
        CheckoutSessionRequest,
        ConnectedAccount,
        ConnectedAccountRequest,
        ProviderError,
        TransferReceipt,
        TransferRequest,
    },
    CheckoutApi,
    CheckoutRedirect,
    CheckoutRequest,
    DisbursementApi,
    OrderManagement,
    PaymentProvider,
    PayoutAccountManagement,
    ProviderEvent,
    ProviderEventKind,
    ReconcileOutcome,
    ReconcilerApi,
    SettlementConfig,
    SettlementDatabase,
    SqliteDatabase,
    SweeperApi,
};
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const BUYER: &str = "buyer-alice";

pub const ACTIVE: CapabilityFlags = CapabilityFlags { charges_enabled: true, payouts_enabled: true, details_submitted: true };

/// A marketplace with one buyer and two makers, both onboarded for payouts.
pub struct Marketplace {
    pub db: SqliteDatabase,
    pub provider: MockProvider,
    pub config: SettlementConfig,
    pub maker_a: Maker,
    pub maker_b: Maker,
}

impl Marketplace {
    pub async fn new() -> Self {
        let db = fresh_database().await;
        let provider = MockProvider::new();
        let profile = BuyerProfile {
            user_id: BUYER.into(),
            full_name: Some("Alice Buyer".into()),
            email: Some("alice@example.com".into()),
        };
        db.upsert_buyer_profile(profile).await.expect("Error creating buyer");
        let maker_a = add_maker(&db, "maker-ann", "Ann's Pottery").await;
        let maker_b = add_maker(&db, "maker-ben", "Ben's Prints").await;
        for maker in [&maker_a, &maker_b] {
            let account_id = account_for(maker);
            db.insert_payout_account(maker.id, &account_id, ACTIVE).await.expect("Error adding payout account");
            provider.set_account_flags(&account_id, ACTIVE);
        }
        Self { db, provider, config: SettlementConfig::default(), maker_a, maker_b }
    }

    /// An order of 100.00 from maker A and 50.00 from maker B.
    pub async fn standard_order(&self, order_number: &str) -> Order {
        let order = NewOrder::new(order_number, BUYER, "eur")
            .with_item(NewLineItem::new(self.maker_a.id, "vase-01", "Blue vase", 1, Cents::from_major(100)))
            .with_item(NewLineItem::new(self.maker_b.id, "print-07", "Harbour print", 2, Cents::from(2500)));
        self.db.insert_order(order).await.expect("Error inserting order")
    }

    pub fn checkout_api(&self) -> CheckoutApi<SqliteDatabase, MockProvider> {
        CheckoutApi::new(self.db.clone(), self.provider.clone(), self.config)
    }

    pub fn reconciler(&self) -> ReconcilerApi<SqliteDatabase, MockProvider> {
        ReconcilerApi::new(self.db.clone(), self.provider.clone(), self.config, Default::default())
    }

    pub fn disburser(&self) -> DisbursementApi<SqliteDatabase, MockProvider> {
        DisbursementApi::new(self.db.clone(), self.provider.clone(), self.config)
    }

    pub fn reconciler_with<P: PaymentProvider>(&self, provider: P) -> ReconcilerApi<SqliteDatabase, P> {
        ReconcilerApi::new(self.db.clone(), provider, self.config, Default::default())
    }

    /// A provider that shares this marketplace's mock and interferes with `db` before the first transfer.
    pub fn interfering(&self, db: &SqliteDatabase, interference: Interference) -> InterferingProvider {
        InterferingProvider::new(self.provider.clone(), db.clone(), interference)
    }

    pub fn sweeper(&self) -> SweeperApi<SqliteDatabase, MockProvider> {
        SweeperApi::new(self.db.clone(), self.provider.clone(), self.config)
    }

    pub async fn checkout(&self, order: &Order) -> CheckoutRedirect {
        let request = CheckoutRequest {
            order_id: order.id,
            provider: ProviderKind::Stripe,
            success_url: "https://shop.example/thanks".into(),
            cancel_url: "https://shop.example/cart".into(),
        };
        self.checkout_api().create_checkout_session(BUYER, request).await.expect("Error creating checkout session")
    }

    /// Delivers a payment-succeeded webhook for the order.
    pub async fn pay(&self, order: &Order, payment_id: &str, paid_at: DateTime<Utc>) -> ReconcileOutcome {
        let event = payment_event(&format!("evt_{payment_id}"), order.id, payment_id, paid_at);
        self.reconciler().handle_event(event).await.expect("Error reconciling payment")
    }

    pub async fn refund(&self, payment_id: &str, amount: Cents) -> ReconcileOutcome {
        let kind = ProviderEventKind::ChargeRefunded { payment_id: payment_id.into(), amount_refunded: amount };
        let event = ProviderEvent::new(ProviderKind::Stripe, &format!("evt_refund_{payment_id}"), "charge.refunded", kind);
        self.reconciler().handle_event(event).await.expect("Error reconciling refund")
    }

    pub async fn order(&self, order_id: i64) -> Order {
        self.db.fetch_order(order_id).await.expect("Error fetching order").expect("Order not found")
    }

    pub async fn tear_down(mut self) {
        let url = self.db.url().to_string();
        if let Err(e) = self.db.close().await {
            error!("🚀️ Failed to close database: {e}");
        }
        Sqlite::drop_database(&url).await.unwrap();
    }
}

pub fn account_for(maker: &Maker) -> String {
    format!("acct_{}", maker.user_id)
}

pub fn payment_event(event_id: &str, order_id: i64, payment_id: &str, paid_at: DateTime<Utc>) -> ProviderEvent {
    let kind = ProviderEventKind::PaymentSucceeded {
        order_id: Some(order_id),
        session_id: None,
        payment_id: payment_id.into(),
        paid_at,
    };
    ProviderEvent::new(ProviderKind::Stripe, event_id, "checkout.session.completed", kind)
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

/// Something that happens to the marketplace while the first transfer is on its way to the provider.
#[derive(Debug, Clone)]
pub enum Interference {
    /// The payment is refunded.
    Refund { payment_id: String, amount: Cents },
    /// The database becomes unreachable.
    CloseDatabase,
}

/// Wraps the mock provider and interferes with the marketplace exactly once, just before the first transfer is
/// executed.
#[derive(Debug, Clone)]
pub struct InterferingProvider {
    pub inner: MockProvider,
    db: SqliteDatabase,
    interference: Interference,
    armed: Arc<AtomicBool>,
}

impl InterferingProvider {
    pub fn new(inner: MockProvider, db: SqliteDatabase, interference: Interference) -> Self {
        Self { inner, db, interference, armed: Arc::new(AtomicBool::new(true)) }
    }

    async fn interfere(&self) {
        if !self.armed.swap(false, Ordering::SeqCst) {
            return;
        }
        match &self.interference {
            Interference::Refund { payment_id, amount } => {
                self.db.record_refund(payment_id, *amount).await.expect("Error recording refund");
            },
            Interference::CloseDatabase => self.db.pool().close().await,
        }
    }
}

impl PaymentProvider for InterferingProvider {
    async fn create_checkout_session(
        &self,
        provider: ProviderKind,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        self.inner.create_checkout_session(provider, request).await
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt, ProviderError> {
        self.interfere().await;
        self.inner.create_transfer(request).await
    }

    async fn create_connected_account(
        &self,
        request: ConnectedAccountRequest,
    ) -> Result<ConnectedAccount, ProviderError> {
        self.inner.create_connected_account(request).await
    }

    async fn fetch_connected_account(&self, account_id: &str) -> Result<ConnectedAccount, ProviderError> {
        self.inner.fetch_connected_account(account_id).await
    }

    async fn create_login_link(&self, account_id: &str) -> Result<String, ProviderError> {
        self.inner.create_login_link(account_id).await
    }
}
