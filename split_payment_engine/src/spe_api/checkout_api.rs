use std::fmt::Debug;

use log::*;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{Order, ProviderKind},
    helpers::{order_metadata, with_timeout},
    spe_api::{
        errors::CheckoutError,
        fee_calculator::{calculate_splits, ItemAmount},
        settlement_config::SettlementConfig,
    },
    traits::{CheckoutSessionRequest, NewPaymentLinkage, NewPlannedTransfer, PaymentProvider, SettlementDatabase},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub order_id: i64,
    pub provider: ProviderKind,
    pub success_url: String,
    pub cancel_url: String,
}

/// Where the buyer must be sent to complete payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRedirect {
    pub order_id: i64,
    pub provider: ProviderKind,
    pub session_id: String,
    pub redirect_url: String,
}

/// `CheckoutApi` turns a buyer's unpaid order into a hosted payment session, and fixes the per-maker split plan
/// that will be used once the payment clears.
pub struct CheckoutApi<B, P> {
    db: B,
    provider: P,
    config: SettlementConfig,
}

impl<B, P> Debug for CheckoutApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CheckoutApi")
    }
}

impl<B, P> CheckoutApi<B, P> {
    pub fn new(db: B, provider: P, config: SettlementConfig) -> Self {
        Self { db, provider, config }
    }
}

impl<B, P> CheckoutApi<B, P>
where
    B: SettlementDatabase,
    P: PaymentProvider,
{
    /// Creates a checkout session for `request.order_id` on behalf of `user_id`.
    ///
    /// The order must belong to the user and must still be unpaid. Nothing is stored unless the provider accepts the
    /// session, so a failed attempt leaves the order exactly as it was. Calling this again for an order that is
    /// already awaiting payment replaces the earlier session.
    pub async fn create_checkout_session(
        &self,
        user_id: &str,
        request: CheckoutRequest,
    ) -> Result<CheckoutRedirect, CheckoutError> {
        validate_return_url("success_url", &request.success_url)?;
        validate_return_url("cancel_url", &request.cancel_url)?;
        let order_id = request.order_id;
        let order = self.db.fetch_order(order_id).await?.ok_or(CheckoutError::OrderNotFound(order_id))?;
        if order.owner_id != user_id {
            warn!("🛒️ User {user_id} tried to check out order #{order_id}, which belongs to someone else");
            return Err(CheckoutError::Forbidden(order_id));
        }
        if !order.status.is_unpaid() {
            return Err(CheckoutError::OrderNotPayable { order_id, status: order.status });
        }
        if !order.total_price.is_positive() {
            return Err(CheckoutError::ValidationError(format!("Order #{order_id} has nothing to pay for")));
        }
        let plan = self.transfer_plan(&order).await?;
        let customer_email = self.db.fetch_buyer_profile(user_id).await?.and_then(|p| p.email);
        let session_request = CheckoutSessionRequest {
            order_id,
            order_number: order.order_number.clone(),
            amount: order.total_price,
            currency: order.currency.clone(),
            description: format!("Order {}", order.order_number),
            success_url: request.success_url,
            cancel_url: request.cancel_url,
            customer_email,
            metadata: order_metadata(&order),
        };
        let session = with_timeout(
            self.config.provider_timeout,
            self.provider.create_checkout_session(request.provider, session_request),
        )
        .await
        .map_err(|e| {
            warn!("🛒️ Could not create a {} checkout session for order #{order_id}: {e}", request.provider);
            CheckoutError::from(e)
        })?;
        let linkage = NewPaymentLinkage { provider: request.provider, external_session_id: session.session_id.clone() };
        self.db.save_checkout_session(order_id, linkage, plan).await?;
        info!(
            "🛒️ Checkout session {} created with {} for order #{order_id} ({} {})",
            session.session_id, request.provider, order.total_price, order.currency
        );
        Ok(CheckoutRedirect {
            order_id,
            provider: request.provider,
            session_id: session.session_id,
            redirect_url: session.redirect_url,
        })
    }

    async fn transfer_plan(&self, order: &Order) -> Result<Vec<NewPlannedTransfer>, CheckoutError> {
        let line_items = self.db.fetch_line_items(order.id).await?;
        let mut items = Vec::with_capacity(line_items.len());
        for item in &line_items {
            let gross = item.total().ok_or_else(|| {
                CheckoutError::ValidationError(format!("Line item {} total is too large", item.id))
            })?;
            items.push(ItemAmount { line_item_id: item.id, maker_id: item.maker_id, gross });
        }
        let splits = calculate_splits(&self.config.fees, order.total_price, &items)?;
        let mut plan = Vec::with_capacity(items.len());
        for group in splits {
            let destination =
                self.db.fetch_payout_account_for_maker(group.maker_id).await?.map(|account| account.account_id);
            if destination.is_none() {
                warn!(
                    "🛒️ Maker #{} has no payout account. Their share of order #{} will fail to transfer until they \
                     onboard.",
                    group.maker_id, order.id
                );
            }
            plan.extend(group.items.into_iter().map(|item| NewPlannedTransfer {
                maker_id: group.maker_id,
                line_item_id: item.line_item_id,
                destination: destination.clone(),
                gross: item.split.gross,
                platform_fee: item.split.platform_fee,
                immediate: item.split.immediate,
                reserve: item.split.reserve,
            }));
        }
        Ok(plan)
    }
}

fn validate_return_url(field: &str, url: &str) -> Result<(), CheckoutError> {
    let url = url.trim();
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(CheckoutError::ValidationError(format!("{field} must be an absolute http(s) URL")))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn return_urls() {
        assert!(validate_return_url("success_url", "https://shop.example/thanks").is_ok());
        assert!(validate_return_url("success_url", "http://localhost:3000/ok").is_ok());
        assert!(validate_return_url("cancel_url", "/relative").is_err());
        assert!(validate_return_url("cancel_url", "").is_err());
        assert!(validate_return_url("cancel_url", "javascript:alert(1)").is_err());
    }
}
