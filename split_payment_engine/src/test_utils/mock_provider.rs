//! An in-memory [`PaymentProvider`] that records every call and can be scripted to fail.
//!
//! Transfers honour idempotency keys the way real providers do: a key that already produced a transfer returns the
//! original receipt without moving money again, while a failed attempt leaves the key unused.
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::{
    db_types::{CapabilityFlags, ProviderKind},
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

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    sessions: Vec<(ProviderKind, CheckoutSessionRequest)>,
    transfer_calls: Vec<TransferRequest>,
    executed: Vec<(TransferRequest, TransferReceipt)>,
    receipts_by_key: HashMap<String, TransferReceipt>,
    failing_destinations: HashSet<String>,
    unconfigured: HashSet<ProviderKind>,
    accounts: HashMap<String, CapabilityFlags>,
    delay: Option<Duration>,
    lost_responses: usize,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{:04}", self.next_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transfers to `destination` are rejected until [`Self::restore_transfers_to`] is called.
    pub fn fail_transfers_to(&self, destination: &str) {
        self.state().failing_destinations.insert(destination.to_string());
    }

    pub fn restore_transfers_to(&self, destination: &str) {
        self.state().failing_destinations.remove(destination);
    }

    /// The next transfer goes through, but its caller sees a [`ProviderError::Timeout`] instead of the receipt.
    pub fn lose_next_transfer_response(&self) {
        self.state().lost_responses += 1;
    }

    /// Checkout sessions for `kind` fail with [`ProviderError::NotConfigured`].
    pub fn unconfigure(&self, kind: ProviderKind) {
        self.state().unconfigured.insert(kind);
    }

    /// Every call waits this long before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    pub fn set_account_flags(&self, account_id: &str, flags: CapabilityFlags) {
        self.state().accounts.insert(account_id.to_string(), flags);
    }

    /// Every transfer request received, including failed and replayed ones.
    pub fn transfer_calls(&self) -> Vec<TransferRequest> {
        self.state().transfer_calls.clone()
    }

    /// Transfers that actually moved money.
    pub fn executed_transfers(&self) -> Vec<TransferRequest> {
        self.state().executed.iter().map(|(req, _)| req.clone()).collect()
    }

    pub fn sessions(&self) -> Vec<(ProviderKind, CheckoutSessionRequest)> {
        self.state().sessions.clone()
    }

    async fn pause(&self) {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl PaymentProvider for MockProvider {
    async fn create_checkout_session(
        &self,
        provider: ProviderKind,
        request: CheckoutSessionRequest,
    ) -> Result<CheckoutSession, ProviderError> {
        self.pause().await;
        let mut state = self.state();
        if state.unconfigured.contains(&provider) {
            return Err(ProviderError::NotConfigured(provider));
        }
        let session_id = state.next_id("cs");
        state.sessions.push((provider, request));
        let redirect_url = format!("https://pay.example/{provider}/{session_id}");
        Ok(CheckoutSession { session_id, redirect_url })
    }

    async fn create_transfer(&self, request: TransferRequest) -> Result<TransferReceipt, ProviderError> {
        self.pause().await;
        let mut state = self.state();
        state.transfer_calls.push(request.clone());
        if let Some(receipt) = state.receipts_by_key.get(&request.idempotency_key) {
            return Ok(receipt.clone());
        }
        if state.failing_destinations.contains(&request.destination) {
            return Err(ProviderError::Rejected(format!("destination {} cannot receive transfers", request.destination)));
        }
        let receipt = TransferReceipt { transfer_id: state.next_id("tr") };
        state.receipts_by_key.insert(request.idempotency_key.clone(), receipt.clone());
        state.executed.push((request, receipt.clone()));
        if state.lost_responses > 0 {
            state.lost_responses -= 1;
            return Err(ProviderError::Timeout);
        }
        Ok(receipt)
    }

    async fn create_connected_account(
        &self,
        _request: ConnectedAccountRequest,
    ) -> Result<ConnectedAccount, ProviderError> {
        self.pause().await;
        let mut state = self.state();
        let account_id = state.next_id("acct");
        let flags = CapabilityFlags::default();
        state.accounts.insert(account_id.clone(), flags);
        Ok(ConnectedAccount { account_id, flags })
    }

    async fn fetch_connected_account(&self, account_id: &str) -> Result<ConnectedAccount, ProviderError> {
        self.pause().await;
        let state = self.state();
        let flags = state
            .accounts
            .get(account_id)
            .copied()
            .ok_or_else(|| ProviderError::Rejected(format!("No such account: {account_id}")))?;
        Ok(ConnectedAccount { account_id: account_id.to_string(), flags })
    }

    async fn create_login_link(&self, account_id: &str) -> Result<String, ProviderError> {
        self.pause().await;
        if !self.state().accounts.contains_key(account_id) {
            return Err(ProviderError::Rejected(format!("No such account: {account_id}")));
        }
        Ok(format!("https://connect.example/login/{account_id}"))
    }
}
