use std::{collections::BTreeMap, sync::Arc};

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Client,
    Method,
};
use serde::de::DeserializeOwned;

use crate::{
    config::StripeConfig,
    data_objects::{StripeAccount, StripeCheckoutSession, StripeLoginLink, StripeTransfer},
    helpers::metadata_form_fields,
    ProviderApiError,
};

#[derive(Clone)]
pub struct StripeApi {
    config: StripeConfig,
    client: Arc<Client>,
}

#[derive(Debug, Clone)]
pub struct NewCheckoutSession {
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub amount: i64,
    pub currency: String,
    pub destination: String,
    pub transfer_group: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct NewConnectedAccount {
    pub country: String,
    pub email: String,
}

impl StripeApi {
    pub fn new(config: StripeConfig) -> Result<Self, ProviderApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.secret_key.reveal()))
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        if let Some(version) = &config.api_version {
            let val =
                HeaderValue::from_str(version).map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
            headers.insert("Stripe-Version", val);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    /// Sends a form-encoded request, which is what the Stripe REST API expects for all writes.
    pub async fn rest_query<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, ProviderApiError> {
        let url = self.url(path);
        trace!("Sending Stripe request: {method} {url}");
        let mut req = self.client.request(method, url);
        if !form.is_empty() {
            req = req.form(form);
        }
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }
        let response = req.send().await?;
        if response.status().is_success() {
            trace!("Stripe request successful. {}", response.status());
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status().as_u16();
            let message = response.text().await?;
            Err(ProviderApiError::Rejected { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url.trim_end_matches('/'))
    }

    pub async fn create_checkout_session(
        &self,
        session: NewCheckoutSession,
    ) -> Result<StripeCheckoutSession, ProviderApiError> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), session.success_url),
            ("cancel_url".to_string(), session.cancel_url),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("line_items[0][price_data][currency]".to_string(), session.currency),
            ("line_items[0][price_data][unit_amount]".to_string(), session.amount.to_string()),
            ("line_items[0][price_data][product_data][name]".to_string(), session.description),
        ];
        if let Some(email) = session.customer_email {
            form.push(("customer_email".to_string(), email));
        }
        form.extend(metadata_form_fields("metadata", &session.metadata));
        // Copied onto the payment intent so that charge events can be traced back to the order too
        form.extend(metadata_form_fields("payment_intent_data[metadata]", &session.metadata));
        debug!("Creating Stripe checkout session for {} minor units", session.amount);
        let result = self.rest_query::<StripeCheckoutSession>(Method::POST, "/v1/checkout/sessions", &form, None).await?;
        info!("Created Stripe checkout session {}", result.id);
        Ok(result)
    }

    pub async fn create_transfer(&self, transfer: NewTransfer) -> Result<StripeTransfer, ProviderApiError> {
        let mut form = vec![
            ("amount".to_string(), transfer.amount.to_string()),
            ("currency".to_string(), transfer.currency),
            ("destination".to_string(), transfer.destination.clone()),
        ];
        if let Some(group) = transfer.transfer_group {
            form.push(("transfer_group".to_string(), group));
        }
        form.extend(metadata_form_fields("metadata", &transfer.metadata));
        debug!("Transferring {} minor units to {}", transfer.amount, transfer.destination);
        let result = self
            .rest_query::<StripeTransfer>(Method::POST, "/v1/transfers", &form, Some(&transfer.idempotency_key))
            .await?;
        info!("Stripe transfer {} to {} created", result.id, result.destination);
        Ok(result)
    }

    pub async fn create_connected_account(
        &self,
        account: NewConnectedAccount,
    ) -> Result<StripeAccount, ProviderApiError> {
        let form = vec![
            ("type".to_string(), "express".to_string()),
            ("country".to_string(), account.country),
            ("email".to_string(), account.email),
            ("capabilities[transfers][requested]".to_string(), "true".to_string()),
            ("capabilities[card_payments][requested]".to_string(), "true".to_string()),
        ];
        let result = self.rest_query::<StripeAccount>(Method::POST, "/v1/accounts", &form, None).await?;
        info!("Created Stripe connected account {}", result.id);
        Ok(result)
    }

    pub async fn fetch_connected_account(&self, account_id: &str) -> Result<StripeAccount, ProviderApiError> {
        let path = format!("/v1/accounts/{account_id}");
        debug!("Fetching Stripe connected account {account_id}");
        self.rest_query::<StripeAccount>(Method::GET, &path, &[], None).await
    }

    pub async fn create_login_link(&self, account_id: &str) -> Result<StripeLoginLink, ProviderApiError> {
        let path = format!("/v1/accounts/{account_id}/login_links");
        self.rest_query::<StripeLoginLink>(Method::POST, &path, &[], None).await
    }
}
