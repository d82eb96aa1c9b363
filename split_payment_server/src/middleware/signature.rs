//! Webhook signature middleware for Actix Web.
//!
//! Payment providers sign every webhook with a shared secret. This middleware reads the raw request body, checks the
//! signature header against it, and puts the body back so that the route handler can deserialize it.
//!
//! Two schemes are supported:
//! * [`SignatureScheme::Stripe`]: the `Stripe-Signature` header, `t=<unix time>,v1=<hex>`. The signature is an
//!   HMAC-SHA256 over `"<t>.<body>"`, and `t` must be within the tolerance window of the current time.
//! * [`SignatureScheme::Base64Body`]: a header holding the base64 HMAC-SHA256 of the body, used by the bank-transfer
//!   provider.
//!
//! Missing or invalid signatures are rejected with `401 Unauthorized`.

use std::{
    future::{ready, Ready},
    rc::Rc,
    time::Duration,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::{ErrorBadRequest, ErrorUnauthorized},
    http::header::HeaderMap,
    web,
    Error,
};
use chrono::Utc;
use futures::future::LocalBoxFuture;
use hmac::Mac;
use log::{debug, trace, warn};
use spg_common::Secret;

use crate::helpers::{keyed_mac, stripe_mac};

pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const BANK_SIGNATURE_HEADER: &str = "X-Bank-Signature";

#[derive(Debug, Clone)]
pub enum SignatureScheme {
    Stripe { tolerance: Duration },
    Base64Body { header: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    Missing,
    Malformed,
    Expired,
    Invalid,
}

impl SignatureScheme {
    /// Checks the signature in `headers` against `body`, using the current time for the Stripe tolerance window.
    pub fn verify(&self, secret: &str, headers: &HeaderMap, body: &[u8]) -> SignatureCheck {
        self.verify_at(secret, headers, body, Utc::now().timestamp())
    }

    pub fn verify_at(&self, secret: &str, headers: &HeaderMap, body: &[u8], now: i64) -> SignatureCheck {
        if secret.is_empty() {
            warn!("🔐️ No webhook secret is configured. Denying access.");
            return SignatureCheck::Invalid;
        }
        match self {
            Self::Stripe { tolerance } => {
                let Some(header) = header_str(headers, STRIPE_SIGNATURE_HEADER) else {
                    return SignatureCheck::Missing;
                };
                verify_stripe(secret, header, body, now, *tolerance)
            },
            Self::Base64Body { header } => {
                let Some(value) = header_str(headers, header) else {
                    return SignatureCheck::Missing;
                };
                let Ok(expected) = base64::decode(value.trim()) else {
                    return SignatureCheck::Malformed;
                };
                match keyed_mac(secret).map(|mac| mac.chain_update(body).verify_slice(&expected)) {
                    Some(Ok(())) => SignatureCheck::Valid,
                    _ => SignatureCheck::Invalid,
                }
            },
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn verify_stripe(secret: &str, header: &str, body: &[u8], now: i64, tolerance: Duration) -> SignatureCheck {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            // Several v1 entries are sent while a secret is being rolled
            Some(("v1", sig)) => signatures.push(sig),
            _ => {},
        }
    }
    let Some(timestamp) = timestamp else {
        return SignatureCheck::Malformed;
    };
    if signatures.is_empty() {
        return SignatureCheck::Malformed;
    }
    let tolerance = i64::try_from(tolerance.as_secs()).unwrap_or(i64::MAX);
    if now.saturating_sub(timestamp).abs() > tolerance {
        debug!("🔐️ Stripe signature timestamp {timestamp} is outside the tolerance window");
        return SignatureCheck::Expired;
    }
    let valid = signatures
        .iter()
        .filter_map(|sig| hex::decode(sig).ok())
        .any(|expected| stripe_mac(secret, timestamp, body).is_some_and(|mac| mac.verify_slice(&expected).is_ok()));
    if valid {
        SignatureCheck::Valid
    } else {
        SignatureCheck::Invalid
    }
}

pub struct SignatureMiddlewareFactory {
    scheme: SignatureScheme,
    key: Secret<String>,
    // If false, then the middleware will not check the signature and always allow the call
    enabled: bool,
}

impl SignatureMiddlewareFactory {
    pub fn new(scheme: SignatureScheme, key: Secret<String>, enabled: bool) -> Self {
        SignatureMiddlewareFactory { scheme, key, enabled }
    }

    pub fn stripe(key: Secret<String>, tolerance: Duration, enabled: bool) -> Self {
        Self::new(SignatureScheme::Stripe { tolerance }, key, enabled)
    }

    pub fn bank(key: Secret<String>, enabled: bool) -> Self {
        Self::new(SignatureScheme::Base64Body { header: BANK_SIGNATURE_HEADER.to_string() }, key, enabled)
    }
}

impl<S, B> Transform<S, ServiceRequest> for SignatureMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = SignatureMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SignatureMiddlewareService {
            scheme: self.scheme.clone(),
            key: self.key.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct SignatureMiddlewareService<S> {
    scheme: SignatureScheme,
    key: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SignatureMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.key.reveal().clone();
        let scheme = self.scheme.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature for request");
            if !enabled {
                trace!("🔐️ Signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                ErrorBadRequest("Failed to extract request data.")
            })?;
            match scheme.verify(&secret, req.headers(), data.as_ref()) {
                SignatureCheck::Valid => {
                    trace!("🔐️ Signature check for request ✅️");
                    req.set_payload(bytes_to_payload(data));
                    service.call(req).await
                },
                SignatureCheck::Missing => {
                    warn!("🔐️ No signature found in webhook request. Denying access.");
                    Err(ErrorUnauthorized("No signature found."))
                },
                check => {
                    warn!("🔐️ Webhook signature check failed ({check:?}). Denying access.");
                    Err(ErrorUnauthorized("Invalid signature."))
                },
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}
