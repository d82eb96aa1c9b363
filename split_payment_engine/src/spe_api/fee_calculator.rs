//! Splits a customer payment into the platform fee, the maker's immediate payout and the withheld reserve.
//!
//! All amounts are whole minor units. The platform fee and the immediate payout are rounded down, and the reserve
//! takes whatever is left, so `platform_fee + immediate + reserve == gross` holds exactly for every line item and
//! every maker group.
use std::collections::BTreeMap;

use chrono::Duration;
use log::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::Cents;

const BPS_PER_UNIT: u32 = 10_000;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeeError {
    #[error("Invalid fee schedule: {0}")]
    InvalidSchedule(String),
    #[error("Line item {0} has a negative amount")]
    NegativeAmount(i64),
    #[error("Order total {total} does not match the sum of its line items ({items})")]
    TotalMismatch { total: Cents, items: Cents },
}

/// The fee configuration. Percentages are held in basis points (1/100th of a percent).
///
/// `platform_fee_bps` drives the platform's share and `immediate_payout_bps` drives the maker's immediate payout. The
/// reserve is not configured independently: it is the remainder of the gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    platform_fee_bps: u32,
    immediate_payout_bps: u32,
    reserve_window_days: i64,
}

impl Default for FeeSchedule {
    /// 10% platform fee, 85% immediate payout, 5% reserve held for 30 days.
    fn default() -> Self {
        Self { platform_fee_bps: 1_000, immediate_payout_bps: 8_500, reserve_window_days: 30 }
    }
}

impl FeeSchedule {
    pub fn new(platform_fee_bps: u32, immediate_payout_bps: u32, reserve_window_days: i64) -> Result<Self, FeeError> {
        if platform_fee_bps + immediate_payout_bps > BPS_PER_UNIT {
            return Err(FeeError::InvalidSchedule(format!(
                "platform fee ({platform_fee_bps} bps) and immediate payout ({immediate_payout_bps} bps) exceed 100%"
            )));
        }
        if reserve_window_days < 0 {
            return Err(FeeError::InvalidSchedule(format!("negative reserve window: {reserve_window_days} days")));
        }
        Ok(Self { platform_fee_bps, immediate_payout_bps, reserve_window_days })
    }

    /// Builds a schedule from percentages, e.g. `10.0` and `85.0`. Fractions of a basis point are rounded.
    pub fn from_percentages(platform_fee: f64, immediate_payout: f64, reserve_window_days: i64) -> Result<Self, FeeError> {
        Self::new(percent_to_bps(platform_fee)?, percent_to_bps(immediate_payout)?, reserve_window_days)
    }

    pub fn platform_fee_bps(&self) -> u32 {
        self.platform_fee_bps
    }

    pub fn immediate_payout_bps(&self) -> u32 {
        self.immediate_payout_bps
    }

    /// The share of gross that is withheld, in basis points.
    pub fn reserve_bps(&self) -> u32 {
        BPS_PER_UNIT - self.platform_fee_bps - self.immediate_payout_bps
    }

    pub fn reserve_window(&self) -> Duration {
        Duration::days(self.reserve_window_days)
    }

    pub fn split(&self, gross: Cents) -> FeeSplit {
        let platform_fee = gross.share_bps(self.platform_fee_bps);
        let immediate = gross.share_bps(self.immediate_payout_bps);
        let reserve = gross - platform_fee - immediate;
        FeeSplit { gross, platform_fee, immediate, reserve }
    }
}

fn percent_to_bps(percent: f64) -> Result<u32, FeeError> {
    if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
        return Err(FeeError::InvalidSchedule(format!("{percent} is not a valid percentage")));
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Ok((percent * 100.0).round() as u32)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    pub gross: Cents,
    pub platform_fee: Cents,
    pub immediate: Cents,
    pub reserve: Cents,
}

impl FeeSplit {
    pub fn is_balanced(&self) -> bool {
        self.platform_fee + self.immediate + self.reserve == self.gross
    }
}

impl std::ops::Add for FeeSplit {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            gross: self.gross + rhs.gross,
            platform_fee: self.platform_fee + rhs.platform_fee,
            immediate: self.immediate + rhs.immediate,
            reserve: self.reserve + rhs.reserve,
        }
    }
}

/// The gross amount of one line item, as input to [`calculate_splits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemAmount {
    pub line_item_id: i64,
    pub maker_id: i64,
    pub gross: Cents,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemSplit {
    pub line_item_id: i64,
    pub split: FeeSplit,
}

/// The split for every line item a single maker sold in an order. `totals` is the sum of the item splits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakerSplit {
    pub maker_id: i64,
    pub totals: FeeSplit,
    pub items: Vec<LineItemSplit>,
}

/// Groups the items by maker and splits each item. Groups are returned in ascending maker id order, and items within
/// a group keep their input order.
pub fn calculate_splits(
    schedule: &FeeSchedule,
    order_total: Cents,
    items: &[ItemAmount],
) -> Result<Vec<MakerSplit>, FeeError> {
    if let Some(item) = items.iter().find(|i| i.gross < Cents::default()) {
        return Err(FeeError::NegativeAmount(item.line_item_id));
    }
    let items_total = items.iter().map(|i| i.gross).sum::<Cents>();
    if items_total != order_total {
        return Err(FeeError::TotalMismatch { total: order_total, items: items_total });
    }
    let mut groups = BTreeMap::<i64, MakerSplit>::new();
    for item in items {
        let split = schedule.split(item.gross);
        let group = groups.entry(item.maker_id).or_insert_with(|| MakerSplit {
            maker_id: item.maker_id,
            totals: FeeSplit::default(),
            items: vec![],
        });
        group.totals = group.totals + split;
        group.items.push(LineItemSplit { line_item_id: item.line_item_id, split });
    }
    let result = groups.into_values().collect::<Vec<_>>();
    trace!("🧮️ Split {order_total} across {} maker groups", result.len());
    Ok(result)
}
