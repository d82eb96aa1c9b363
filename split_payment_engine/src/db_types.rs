use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
pub use spg_common::Cents;
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid value for {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

//--------------------------------------     OrderStatus       ---------------------------------------------------------
/// Fulfilment status of an order.
///
/// Statuses only move forward along `pending → awaiting_payment → processing → shipped → delivered`. `refunded`,
/// `payment_failed` and `cancelled` are terminal and can only be entered from certain earlier states. See
/// [`OrderStatus::can_transition_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    AwaitingPayment,
    Processing,
    Shipped,
    Delivered,
    Refunded,
    PaymentFailed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Refunded => "refunded",
            Self::PaymentFailed => "payment_failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Position on the forward fulfilment path. Terminal side-branches have no rank.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Pending => Some(0),
            Self::AwaitingPayment => Some(1),
            Self::Processing => Some(2),
            Self::Shipped => Some(3),
            Self::Delivered => Some(4),
            _ => None,
        }
    }

    /// True if the order has not been charged yet.
    pub fn is_unpaid(&self) -> bool {
        matches!(self, Self::Pending | Self::AwaitingPayment)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Refunded | Self::PaymentFailed | Self::Cancelled)
    }

    /// Returns true if moving from `self` to `next` is a legal status change.
    ///
    /// * Forward moves along the fulfilment path are allowed, and may skip steps.
    /// * `cancelled` may be entered from any state that is not terminal.
    /// * `payment_failed` may only be entered while the order is unpaid.
    /// * `refunded` may be entered from any state other than `refunded` itself, since the provider reports refunds
    ///   after the fact and the order must reflect them.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        match next {
            Self::Refunded => *self != Self::Refunded,
            Self::Cancelled => !self.is_terminal(),
            Self::PaymentFailed => self.is_unpaid(),
            _ => match (self.rank(), next.rank()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "awaiting_payment" => Ok(Self::AwaitingPayment),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "refunded" => Ok(Self::Refunded),
            "payment_failed" => Ok(Self::PaymentFailed),
            "cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError::new("order status", s)),
        }
    }
}

//--------------------------------------     PaymentStatus     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    Paid,
    Refunded,
    Failed,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unpaid => "unpaid",
            Self::Paid => "paid",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    /// The authenticated user that placed the order
    pub owner_id: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub total_price: Cents,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Makers may only be paid once the order is `processing` and the charge has cleared.
    pub fn is_disbursable(&self) -> bool {
        self.status == OrderStatus::Processing && self.payment_status == PaymentStatus::Paid
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub order_number: String,
    pub owner_id: String,
    pub currency: String,
    pub line_items: Vec<NewLineItem>,
}

impl NewOrder {
    pub fn new<S: Into<String>>(order_number: S, owner_id: S, currency: S) -> Self {
        Self { order_number: order_number.into(), owner_id: owner_id.into(), currency: currency.into(), line_items: vec![] }
    }

    pub fn with_item(mut self, item: NewLineItem) -> Self {
        self.line_items.push(item);
        self
    }

    /// The sum of all line item totals, or `None` if it overflows.
    pub fn total_price(&self) -> Option<Cents> {
        self.line_items.iter().try_fold(Cents::default(), |acc, item| item.total().map(|t| acc + t))
    }
}

//--------------------------------------       LineItem        ---------------------------------------------------------
/// One product line of an order. `unit_price` is a snapshot taken when the order was created.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LineItem {
    pub id: i64,
    pub order_id: i64,
    pub maker_id: i64,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Cents,
}

impl LineItem {
    pub fn total(&self) -> Option<Cents> {
        self.unit_price.checked_mul(self.quantity)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLineItem {
    pub maker_id: i64,
    pub product_id: String,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: Cents,
}

impl NewLineItem {
    pub fn new(maker_id: i64, product_id: &str, product_name: &str, quantity: i64, unit_price: Cents) -> Self {
        Self {
            maker_id,
            product_id: product_id.to_string(),
            product_name: product_name.to_string(),
            quantity,
            unit_price,
        }
    }

    pub fn total(&self) -> Option<Cents> {
        self.unit_price.checked_mul(self.quantity)
    }
}

//--------------------------------------   Makers and buyers   ---------------------------------------------------------
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Maker {
    pub id: i64,
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    /// ISO 3166 country code, used when opening the maker's connected account
    pub country: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaker {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    pub country: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BuyerProfile {
    pub user_id: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

//--------------------------------------   Payout accounts     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutAccountStatus {
    Pending,
    Restricted,
    Active,
}

impl Display for PayoutAccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Restricted => "restricted",
            Self::Active => "active",
        };
        f.write_str(s)
    }
}

/// Capability flags reported by the provider for a connected account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityFlags {
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
}

impl CapabilityFlags {
    pub fn status(&self) -> PayoutAccountStatus {
        if self.charges_enabled && self.payouts_enabled {
            PayoutAccountStatus::Active
        } else if self.details_submitted {
            PayoutAccountStatus::Restricted
        } else {
            PayoutAccountStatus::Pending
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MakerPayoutAccount {
    pub id: i64,
    pub maker_id: i64,
    /// The provider's connected account identifier
    pub account_id: String,
    pub charges_enabled: bool,
    pub payouts_enabled: bool,
    pub details_submitted: bool,
    pub status: PayoutAccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MakerPayoutAccount {
    pub fn flags(&self) -> CapabilityFlags {
        CapabilityFlags {
            charges_enabled: self.charges_enabled,
            payouts_enabled: self.payouts_enabled,
            details_submitted: self.details_submitted,
        }
    }
}

//--------------------------------------   Payment linkage     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Stripe,
    BankTransfer,
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stripe => f.write_str("stripe"),
            Self::BankTransfer => f.write_str("bank_transfer"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Self::Stripe),
            "bank_transfer" | "bank" => Ok(Self::BankTransfer),
            s => Err(ConversionError::new("provider", s)),
        }
    }
}

/// Progress of the immediate payout for an order. Moving from `pending` to `in_progress` is the claim that
/// guarantees makers are paid at most once per order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisbursementState {
    Pending,
    InProgress,
    Completed,
}

/// Links an order to the provider session and payment that settle it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentLinkage {
    pub order_id: i64,
    pub provider: ProviderKind,
    pub external_session_id: String,
    /// Set once the provider confirms the charge. Unique across all orders.
    pub external_payment_id: Option<String>,
    pub refund_amount: Option<Cents>,
    pub paid_at: Option<DateTime<Utc>>,
    pub disbursement: DisbursementState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One line of the per-maker split plan computed at checkout time.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransferPlanRow {
    pub id: i64,
    pub order_id: i64,
    pub maker_id: i64,
    pub line_item_id: i64,
    /// The maker's connected account at checkout time, if they had one
    pub destination: Option<String>,
    pub gross: Cents,
    pub platform_fee: Cents,
    pub immediate: Cents,
    pub reserve: Cents,
}

//--------------------------------------     Ledger rows       ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Pending,
    ImmediateSent,
    Completed,
    Failed,
    Refunded,
}

impl Display for LedgerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::ImmediateSent => "immediate_sent",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// What one maker is owed for one order line item, and how much of it has been paid out.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerRow {
    pub id: i64,
    pub order_id: i64,
    pub line_item_id: i64,
    pub maker_id: i64,
    pub destination: Option<String>,
    pub gross: Cents,
    pub platform_fee: Cents,
    pub immediate: Cents,
    pub reserve: Cents,
    pub reserve_release_at: DateTime<Utc>,
    pub reserve_released: bool,
    pub status: LedgerStatus,
    pub immediate_transfer_id: Option<String>,
    pub release_transfer_id: Option<String>,
    pub error: Option<String>,
    /// Number of immediate payout attempts made for this row
    pub attempts: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Idempotency key of the last immediate transfer attempt, if its outcome may still be pending at the provider
    pub transfer_key: Option<String>,
}

impl LedgerRow {
    /// The sweeper selects a row if and only if this returns true.
    pub fn is_reserve_eligible(&self, now: DateTime<Utc>) -> bool {
        !self.reserve_released &&
            self.status == LedgerStatus::ImmediateSent &&
            self.reserve_release_at <= now &&
            self.reserve.is_positive()
    }

    pub fn is_balanced(&self) -> bool {
        self.immediate + self.reserve + self.platform_fee == self.gross
    }
}

#[derive(Debug, Clone)]
pub struct NewLedgerRow {
    pub order_id: i64,
    pub line_item_id: i64,
    pub maker_id: i64,
    pub destination: Option<String>,
    pub gross: Cents,
    pub platform_fee: Cents,
    pub immediate: Cents,
    pub reserve: Cents,
    pub reserve_release_at: DateTime<Utc>,
    pub status: LedgerStatus,
    pub transfer_key: Option<String>,
    pub currency: String,
}

/// Reserve release date for a payment made at `paid_at`.
pub fn reserve_release_time(paid_at: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    paid_at + window
}
