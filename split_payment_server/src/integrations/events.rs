//! Translates provider webhook payloads into [`ProviderEvent`]s.
//!
//! Event types the settlement flow does not act on become [`ProviderEventKind::Unrecognized`], so that they are
//! acknowledged rather than retried. A recognised event type whose payload is missing the fields the flow depends on
//! is an [`EventConversionError`] and is answered with `400 Bad Request`.
use chrono::{DateTime, TimeZone, Utc};
use log::*;
use payment_providers::{BankWebhookEvent, StripeAccount, StripeCheckoutSession, StripeEvent};
use serde::Deserialize;
use serde_json::Value;
use split_payment_engine::{
    db_types::{Cents, ProviderKind},
    helpers::{order_id_from_metadata, order_id_from_reference},
    ProviderEvent,
    ProviderEventKind,
};
use thiserror::Error;

use crate::integrations::gateway::capability_flags;

#[derive(Debug, Clone, Error)]
pub enum EventConversionError {
    #[error("The {event_type} payload could not be read. {reason}")]
    InvalidPayload { event_type: String, reason: String },
    #[error("The {event_type} payload is missing {field}")]
    MissingField { event_type: String, field: &'static str },
}

/// The subset of a Stripe charge object needed to apply a refund.
#[derive(Debug, Clone, Deserialize)]
struct StripeCharge {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_refunded: i64,
}

pub fn stripe_event_to_provider_event(event: StripeEvent) -> Result<ProviderEvent, EventConversionError> {
    let StripeEvent { id, event_type, data, created, .. } = event;
    let kind = match event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            let session: StripeCheckoutSession = parse_object(&event_type, data.object)?;
            // Delayed payment methods complete the session before the money arrives
            if session.payment_status.as_deref().is_some_and(|s| s != "paid") {
                debug!("🔄️ Checkout session {} completed without payment. Waiting for the async event.", session.id);
                ProviderEventKind::Unrecognized
            } else {
                let order_id = order_id_from_metadata(&session.metadata);
                let payment_id = session.payment_intent.clone().unwrap_or_else(|| session.id.clone());
                ProviderEventKind::PaymentSucceeded {
                    order_id,
                    session_id: Some(session.id),
                    payment_id,
                    paid_at: event_time(created),
                }
            }
        },
        "checkout.session.expired" | "checkout.session.async_payment_failed" => {
            let session: StripeCheckoutSession = parse_object(&event_type, data.object)?;
            let order_id = order_id_from_metadata(&session.metadata);
            ProviderEventKind::SessionExpired { order_id, session_id: Some(session.id) }
        },
        "charge.refunded" => {
            let charge: StripeCharge = parse_object(&event_type, data.object)?;
            let payment_id = charge.payment_intent.unwrap_or(charge.id);
            ProviderEventKind::ChargeRefunded { payment_id, amount_refunded: Cents::from(charge.amount_refunded) }
        },
        "account.updated" => {
            let account: StripeAccount = parse_object(&event_type, data.object)?;
            let flags = capability_flags(&account);
            ProviderEventKind::AccountUpdated { account_id: account.id, flags }
        },
        _ => ProviderEventKind::Unrecognized,
    };
    Ok(ProviderEvent::new(ProviderKind::Stripe, id, event_type, kind))
}

pub fn bank_event_to_provider_event(event: BankWebhookEvent) -> Result<ProviderEvent, EventConversionError> {
    let BankWebhookEvent { id, event_type, created_at, data } = event;
    let order_id =
        order_id_from_metadata(&data.metadata).or_else(|| data.reference.as_deref().and_then(order_id_from_reference));
    let kind = match event_type.as_str() {
        // The bank payment id doubles as the checkout session id
        "payment.succeeded" | "payment.completed" => ProviderEventKind::PaymentSucceeded {
            order_id,
            session_id: Some(data.payment_id.clone()),
            payment_id: data.payment_id,
            paid_at: created_at,
        },
        "payment.expired" | "payment.cancelled" => {
            ProviderEventKind::SessionExpired { order_id, session_id: Some(data.payment_id) }
        },
        "payment.refunded" => {
            let amount = data
                .refunded_amount
                .or(data.amount)
                .ok_or_else(|| EventConversionError::MissingField { event_type: event_type.clone(), field: "refunded_amount" })?;
            ProviderEventKind::ChargeRefunded { payment_id: data.payment_id, amount_refunded: Cents::from(amount) }
        },
        _ => ProviderEventKind::Unrecognized,
    };
    Ok(ProviderEvent::new(ProviderKind::BankTransfer, id, event_type, kind))
}

fn parse_object<T: for<'de> Deserialize<'de>>(event_type: &str, object: Value) -> Result<T, EventConversionError> {
    serde_json::from_value(object)
        .map_err(|e| EventConversionError::InvalidPayload { event_type: event_type.to_string(), reason: e.to_string() })
}

fn event_time(created: Option<i64>) -> DateTime<Utc> {
    created.and_then(|t| Utc.timestamp_opt(t, 0).single()).unwrap_or_else(Utc::now)
}
