use std::{collections::BTreeMap, fmt::Debug};

use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Cents, CapabilityFlags, Order, ProviderKind},
    events::{EventProducers, NotificationIntent},
    spe_api::{
        disbursement_api::{DisbursementApi, DisbursementReport},
        errors::ReconcileError,
        provider_events::{ProviderEvent, ProviderEventKind},
        settlement_config::SettlementConfig,
    },
    traits::{CapabilityUpdate, PaymentProvider, PaymentRecorded, RefundRecorded, SettlementDatabase, SettlementDbError},
};

/// An event that changed settlement state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppliedEvent {
    pub order_id: Option<i64>,
    pub detail: String,
    pub notifications: Vec<NotificationIntent>,
    pub disbursement: Option<DisbursementReport>,
}

impl AppliedEvent {
    fn new<S: Into<String>>(order_id: Option<i64>, detail: S) -> Self {
        Self { order_id, detail: detail.into(), ..Default::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ReconcileOutcome {
    Applied(AppliedEvent),
    /// The event id has been handled before
    AlreadyProcessed,
    /// The event is well formed but does not apply to the current state (unknown order, stale transition, ...)
    NotApplicable(String),
    /// The event type is not one the settlement flow acts on
    Ignored(String),
}

impl ReconcileOutcome {
    pub fn notifications(&self) -> &[NotificationIntent] {
        match self {
            Self::Applied(applied) => &applied.notifications,
            _ => &[],
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// `ReconcilerApi` applies authenticated provider webhooks to orders, payment linkages, ledger rows and payout
/// accounts.
///
/// Every event is safe to deliver any number of times, in any order. Providers retry on failure, so an event is only
/// recorded as processed once it has been fully handled; a redelivery of an event that failed part-way through picks
/// up where the previous attempt stopped.
pub struct ReconcilerApi<B, P> {
    db: B,
    disburser: DisbursementApi<B, P>,
    producers: EventProducers,
}

impl<B, P> Debug for ReconcilerApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconcilerApi")
    }
}

impl<B, P> ReconcilerApi<B, P>
where B: Clone
{
    pub fn new(db: B, provider: P, config: SettlementConfig, producers: EventProducers) -> Self {
        let disburser = DisbursementApi::new(db.clone(), provider, config);
        Self { db, disburser, producers }
    }
}

impl<B, P> ReconcilerApi<B, P>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    /// Reconciles the event, then hands any notification intents to the subscribers.
    pub async fn handle_event(&self, event: ProviderEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let outcome = self.reconcile(event).await?;
        self.producers.publish_notifications(outcome.notifications());
        Ok(outcome)
    }

    /// Applies the event to the settlement state without sending any notifications. The intents are returned in the
    /// outcome.
    pub async fn reconcile(&self, event: ProviderEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let ProviderEvent { provider, event_id, event_type, kind } = event;
        if matches!(kind, ProviderEventKind::Unrecognized) {
            trace!("🔄️ Ignoring {provider} event {event_id} of type {event_type}");
            return Ok(ReconcileOutcome::Ignored(format!("{event_type} events are not handled")));
        }
        if self.db.webhook_event_seen(provider, &event_id).await? {
            debug!("🔄️ {provider} event {event_id} ({event_type}) has already been processed");
            return Ok(ReconcileOutcome::AlreadyProcessed);
        }
        let outcome = match kind {
            ProviderEventKind::PaymentSucceeded { order_id, session_id, payment_id, paid_at } => {
                self.payment_succeeded(provider, order_id, session_id, &payment_id, paid_at).await?
            },
            ProviderEventKind::SessionExpired { order_id, session_id } => {
                self.session_expired(provider, order_id, session_id).await?
            },
            ProviderEventKind::ChargeRefunded { payment_id, amount_refunded } => {
                self.charge_refunded(&payment_id, amount_refunded).await?
            },
            ProviderEventKind::AccountUpdated { account_id, flags } => self.account_updated(&account_id, flags).await?,
            ProviderEventKind::Unrecognized => ReconcileOutcome::Ignored(event_type.clone()),
        };
        match &outcome {
            ReconcileOutcome::Applied(applied) => {
                info!("🔄️ {provider} event {event_id} ({event_type}) applied. {}", applied.detail);
            },
            ReconcileOutcome::NotApplicable(reason) => {
                info!("🔄️ {provider} event {event_id} ({event_type}) does not apply. {reason}");
            },
            _ => {},
        }
        if !self.db.record_webhook_event(provider, &event_id, &event_type).await? {
            debug!("🔄️ {provider} event {event_id} was recorded concurrently by another delivery");
        }
        Ok(outcome)
    }

    /// Finds the order an event refers to, preferring the order id in the event metadata and falling back to the
    /// checkout session id.
    async fn locate_order(
        &self,
        provider: ProviderKind,
        order_id: Option<i64>,
        session_id: Option<&str>,
    ) -> Result<Option<Order>, SettlementDbError> {
        if let Some(id) = order_id {
            if let Some(order) = self.db.fetch_order(id).await? {
                return Ok(Some(order));
            }
        }
        match session_id {
            Some(session) => self.db.fetch_order_by_session(provider, session).await,
            None => Ok(None),
        }
    }

    async fn payment_succeeded(
        &self,
        provider: ProviderKind,
        order_id: Option<i64>,
        session_id: Option<String>,
        payment_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(order) = self.locate_order(provider, order_id, session_id.as_deref()).await? else {
            let reason = format!("No order matches payment {payment_id} (order {order_id:?}, session {session_id:?})");
            return Ok(ReconcileOutcome::NotApplicable(reason));
        };
        let recorded = match self.db.record_payment_success(order.id, payment_id, paid_at).await {
            Ok(r) => r,
            Err(SettlementDbError::PaymentAlreadyLinked(p)) => {
                error!("🔄️ Payment {p} is already linked to a different order than #{}", order.id);
                return Ok(ReconcileOutcome::NotApplicable(format!("Payment {p} belongs to another order")));
            },
            Err(e) => return Err(e.into()),
        };
        match recorded {
            PaymentRecorded::Recorded(order) => {
                let mut applied = AppliedEvent::new(Some(order.id), format!("Order #{} is paid", order.id));
                applied.notifications = self.payment_notifications(&order).await;
                applied.disbursement = self.disburser.disburse_order(order.id).await?;
                Ok(ReconcileOutcome::Applied(applied))
            },
            PaymentRecorded::AlreadyRecorded(order) => {
                // A previous delivery may have failed between recording the payment and paying the makers
                match self.disburser.disburse_order(order.id).await? {
                    Some(report) => {
                        let mut applied =
                            AppliedEvent::new(Some(order.id), format!("Resumed disbursement for order #{}", order.id));
                        applied.disbursement = Some(report);
                        Ok(ReconcileOutcome::Applied(applied))
                    },
                    None => Ok(ReconcileOutcome::NotApplicable(format!(
                        "Payment {payment_id} was already recorded for order #{}",
                        order.id
                    ))),
                }
            },
            PaymentRecorded::NotPayable(order) => {
                error!(
                    "🔄️ Payment {payment_id} of {} {} arrived for order #{}, which is {}. The payment was NOT applied \
                     and must be refunded manually.",
                    order.total_price, order.currency, order.id, order.status
                );
                Ok(ReconcileOutcome::NotApplicable(format!(
                    "Order #{} is {} and cannot accept payment {payment_id}",
                    order.id, order.status
                )))
            },
            PaymentRecorded::NoLinkage => {
                Ok(ReconcileOutcome::NotApplicable(format!("Order #{} has no checkout session", order.id)))
            },
        }
    }

    async fn session_expired(
        &self,
        provider: ProviderKind,
        order_id: Option<i64>,
        session_id: Option<String>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(order) = self.locate_order(provider, order_id, session_id.as_deref()).await? else {
            return Ok(ReconcileOutcome::NotApplicable(format!("No order matches expired session {session_id:?}")));
        };
        match self.db.expire_checkout(order.id).await? {
            Some(order) => Ok(ReconcileOutcome::Applied(AppliedEvent::new(
                Some(order.id),
                format!("Checkout for order #{} expired. Order is now {}", order.id, order.status),
            ))),
            None => Ok(ReconcileOutcome::NotApplicable(format!(
                "Order #{} is {} and no longer awaiting payment",
                order.id, order.status
            ))),
        }
    }

    async fn charge_refunded(&self, payment_id: &str, amount: Cents) -> Result<ReconcileOutcome, ReconcileError> {
        match self.db.record_refund(payment_id, amount).await? {
            RefundRecorded::Refunded { order, refund_amount, ledger_rows_refunded } => {
                Ok(ReconcileOutcome::Applied(AppliedEvent::new(
                    Some(order.id),
                    format!(
                        "Order #{} refunded ({refund_amount} {}). {ledger_rows_refunded} ledger rows will not be paid \
                         out further",
                        order.id, order.currency
                    ),
                )))
            },
            RefundRecorded::AlreadyRefunded(order) => {
                Ok(ReconcileOutcome::NotApplicable(format!("Order #{} is already refunded", order.id)))
            },
            RefundRecorded::UnknownPayment => {
                Ok(ReconcileOutcome::NotApplicable(format!("Payment {payment_id} is not linked to any order")))
            },
        }
    }

    async fn account_updated(
        &self,
        account_id: &str,
        flags: CapabilityFlags,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        match self.db.update_payout_capabilities(account_id, flags).await? {
            CapabilityUpdate::Changed(account) => Ok(ReconcileOutcome::Applied(AppliedEvent::new(
                None,
                format!("Payout account {account_id} of maker #{} is now {}", account.maker_id, account.status),
            ))),
            CapabilityUpdate::Unchanged(_) => {
                Ok(ReconcileOutcome::NotApplicable(format!("Payout account {account_id} is unchanged")))
            },
            CapabilityUpdate::NotFound => {
                Ok(ReconcileOutcome::NotApplicable(format!("Payout account {account_id} is not known")))
            },
        }
    }

    /// Builds the buyer and maker notifications for a newly paid order. Failures here are logged and yield fewer
    /// notifications; they never affect the payment.
    async fn payment_notifications(&self, order: &Order) -> Vec<NotificationIntent> {
        match self.build_payment_notifications(order).await {
            Ok(intents) => intents,
            Err(e) => {
                warn!("🔄️ Could not prepare notifications for order #{}. {e}", order.id);
                vec![]
            },
        }
    }

    async fn build_payment_notifications(&self, order: &Order) -> Result<Vec<NotificationIntent>, SettlementDbError> {
        let buyer_email = self.db.fetch_buyer_profile(&order.owner_id).await?.and_then(|p| p.email);
        let mut intents = vec![
            NotificationIntent::OrderConfirmation {
                order_id: order.id,
                order_number: order.order_number.clone(),
                recipient: buyer_email.clone(),
                total: order.total_price,
                currency: order.currency.clone(),
            },
            NotificationIntent::PaymentReceived {
                order_id: order.id,
                order_number: order.order_number.clone(),
                recipient: buyer_email,
                amount: order.total_price,
                currency: order.currency.clone(),
            },
        ];
        let mut per_maker = BTreeMap::<i64, (usize, Cents)>::new();
        for item in self.db.fetch_line_items(order.id).await? {
            let entry = per_maker.entry(item.maker_id).or_default();
            entry.0 += 1;
            entry.1 += item.total().unwrap_or_default();
        }
        for (maker_id, (item_count, gross)) in per_maker {
            let Some(maker) = self.db.fetch_maker(maker_id).await? else {
                warn!("🔄️ Maker #{maker_id} on order #{} does not exist. Not notifying them.", order.id);
                continue;
            };
            intents.push(NotificationIntent::MakerNewOrder {
                maker_id,
                order_id: order.id,
                order_number: order.order_number.clone(),
                recipient: maker.email,
                item_count,
                gross,
                currency: order.currency.clone(),
            });
        }
        Ok(intents)
    }
}
