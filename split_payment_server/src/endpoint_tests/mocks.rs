use std::sync::Arc;

use mockall::mock;
use split_payment_engine::{
    db_types::ProviderKind,
    traits::{
        CheckoutSession,
        CheckoutSessionRequest,
        ConnectedAccount,
        ConnectedAccountRequest,
        PaymentProvider,
        ProviderError,
        TransferReceipt,
        TransferRequest,
    },
};

mock! {
    pub Gateway {}
    impl Clone for Gateway {
        fn clone(&self) -> Self;
    }
    impl PaymentProvider for Gateway {
        async fn create_checkout_session(&self, provider: ProviderKind, request: CheckoutSessionRequest) -> Result<CheckoutSession, ProviderError>;
        async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt, ProviderError>;
        async fn create_connected_account(&self, request: ConnectedAccountRequest) -> Result<ConnectedAccount, ProviderError>;
        async fn fetch_connected_account(&self, account_id: &str) -> Result<ConnectedAccount, ProviderError>;
        async fn create_login_link(&self, account_id: &str) -> Result<String, ProviderError>;
    }
}

/// Every API gets its own copy of the provider, so the mock is shared rather than cloned. Expectations set on the
/// inner mock apply to all of them.
#[derive(Clone)]
pub struct SharedGateway(pub Arc<MockGateway>);

impl SharedGateway {
    pub fn new(mock: MockGateway) -> Self {
        Self(Arc::new(mock))
    }
}

impl PaymentProvider for SharedGateway {
    async fn create_checkout_session(
        &self,
        provider: ProviderKind,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        self.0.create_checkout_session(provider, request).await
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt, ProviderError> {
        self.0.create_transfer(request).await
    }

    async fn create_connected_account(
        &self,
        request: ConnectedAccountRequest,
    ) -> Result<ConnectedAccount, ProviderError> {
        self.0.create_connected_account(request).await
    }

    async fn fetch_connected_account(&self, account_id: &str) -> Result<ConnectedAccount, ProviderError> {
        self.0.fetch_connected_account(account_id).await
    }

    async fn create_login_link(&self, account_id: &str) -> Result<String, ProviderError> {
        self.0.create_login_link(account_id).await
    }
}
