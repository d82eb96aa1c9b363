use log::*;
use payment_providers::{
    BankPaymentRequest,
    BankTransferApi,
    BankTransferConfig,
    NewCheckoutSession,
    NewConnectedAccount,
    NewTransfer,
    ProviderApiError,
    StripeAccount,
    StripeApi,
    StripeConfig,
};
use split_payment_engine::{
    db_types::{CapabilityFlags, ProviderKind},
    helpers::order_reference,
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

/// The live [`PaymentProvider`]. Stripe handles card checkout, transfers and connected accounts; the bank-transfer
/// provider only hosts checkout pages. Either may be absent, in which case calls that need it fail with
/// [`ProviderError::NotConfigured`].
#[derive(Clone, Default)]
pub struct ProviderGateway {
    stripe: Option<StripeApi>,
    bank: Option<BankTransferApi>,
}

impl ProviderGateway {
    pub fn new(stripe: Option<StripeApi>, bank: Option<BankTransferApi>) -> Self {
        Self { stripe, bank }
    }

    pub fn from_config(stripe: Option<StripeConfig>, bank: Option<BankTransferConfig>) -> Result<Self, ProviderApiError> {
        let stripe = stripe.map(StripeApi::new).transpose()?;
        let bank = bank.map(BankTransferApi::new).transpose()?;
        info!(
            "🔌️ Payment providers: Stripe {}, bank transfer {}",
            if stripe.is_some() { "enabled" } else { "disabled" },
            if bank.is_some() { "enabled" } else { "disabled" }
        );
        Ok(Self { stripe, bank })
    }

    fn stripe(&self) -> Result<&StripeApi, ProviderError> {
        self.stripe.as_ref().ok_or(ProviderError::NotConfigured(ProviderKind::Stripe))
    }

    fn bank(&self) -> Result<&BankTransferApi, ProviderError> {
        self.bank.as_ref().ok_or(ProviderError::NotConfigured(ProviderKind::BankTransfer))
    }
}

impl PaymentProvider for ProviderGateway {
    async fn create_checkout_session(
        &self,
        provider: ProviderKind,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        match provider {
            ProviderKind::Stripe => {
                let session = NewCheckoutSession {
                    amount: request.amount.value(),
                    currency: request.currency,
                    description: request.description,
                    success_url: request.success_url,
                    cancel_url: request.cancel_url,
                    customer_email: request.customer_email,
                    metadata: request.metadata,
                };
                let result = self.stripe()?.create_checkout_session(session).await.map_err(provider_error)?;
                let redirect_url = result.url.ok_or_else(|| {
                    ProviderError::Rejected(format!("Checkout session {} has no redirect URL", result.id))
                })?;
                Ok(CheckoutSession { session_id: result.id, redirect_url })
            },
            ProviderKind::BankTransfer => {
                let payment = BankPaymentRequest {
                    amount: request.amount.value(),
                    currency: request.currency,
                    description: request.description,
                    reference: order_reference(&request.order_number, request.order_id),
                    success_url: request.success_url,
                    cancel_url: request.cancel_url,
                    customer_email: request.customer_email,
                    metadata: request.metadata,
                };
                let result = self.bank()?.create_payment(payment).await.map_err(provider_error)?;
                Ok(CheckoutSession { session_id: result.id, redirect_url: result.payment_url })
            },
        }
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt, ProviderError> {
        let transfer = NewTransfer {
            amount: request.amount.value(),
            currency: request.currency,
            destination: request.destination,
            transfer_group: request.transfer_group,
            metadata: request.metadata,
            idempotency_key: request.idempotency_key,
        };
        let result = self.stripe()?.create_transfer(transfer).await.map_err(provider_error)?;
        Ok(TransferReceipt { transfer_id: result.id })
    }

    async fn create_connected_account(
        &self,
        request: ConnectedAccountRequest,
    ) -> Result<ConnectedAccount, ProviderError> {
        let account = NewConnectedAccount { country: request.country, email: request.email };
        let result = self.stripe()?.create_connected_account(account).await.map_err(provider_error)?;
        Ok(connected_account(result))
    }

    async fn fetch_connected_account(&self, account_id: &str) -> Result<ConnectedAccount, ProviderError> {
        let result = self.stripe()?.fetch_connected_account(account_id).await.map_err(provider_error)?;
        Ok(connected_account(result))
    }

    async fn create_login_link(&self, account_id: &str) -> Result<String, ProviderError> {
        let link = self.stripe()?.create_login_link(account_id).await.map_err(provider_error)?;
        Ok(link.url)
    }
}

pub fn capability_flags(account: &StripeAccount) -> CapabilityFlags {
    CapabilityFlags {
        charges_enabled: account.charges_enabled,
        payouts_enabled: account.payouts_enabled,
        details_submitted: account.details_submitted,
    }
}

fn connected_account(account: StripeAccount) -> ConnectedAccount {
    let flags = capability_flags(&account);
    ConnectedAccount { account_id: account.id, flags }
}

fn provider_error(e: ProviderApiError) -> ProviderError {
    match e {
        ProviderApiError::Timeout => ProviderError::Timeout,
        ProviderApiError::Rejected { status, message } => {
            warn!("🔌️ Provider rejected request with status {status}");
            ProviderError::Rejected(format!("{status}: {message}"))
        },
        ProviderApiError::Transport(s) | ProviderApiError::JsonError(s) | ProviderApiError::Initialization(s) => {
            ProviderError::Transport(s)
        },
    }
}
