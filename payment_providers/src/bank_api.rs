use std::sync::Arc;

use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::BankTransferConfig,
    data_objects::{BankPayment, BankPaymentRequest},
    ProviderApiError,
};

/// Client for the bank-transfer checkout provider. It only hosts payment pages; payouts to makers always go
/// through Stripe.
#[derive(Clone)]
pub struct BankTransferApi {
    config: BankTransferConfig,
    client: Arc<Client>,
}

impl BankTransferApi {
    pub fn new(config: BankTransferConfig) -> Result<Self, ProviderApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_key.reveal()))
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<B>,
    ) -> Result<T, ProviderApiError> {
        let url = self.url(path);
        trace!("Sending bank API request: {url}");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await?;
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status().as_u16();
            let message = response.text().await?;
            Err(ProviderApiError::Rejected { status, message })
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }

    pub async fn create_payment(&self, request: BankPaymentRequest) -> Result<BankPayment, ProviderApiError> {
        debug!("Creating bank-transfer payment for reference {}", request.reference);
        let result = self.rest_query::<BankPayment, _>(Method::POST, "/v1/payments", Some(request)).await?;
        info!("Created bank-transfer payment {}", result.id);
        Ok(result)
    }
}
