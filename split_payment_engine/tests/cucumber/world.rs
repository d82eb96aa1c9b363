use std::{collections::HashMap, fmt::Debug};

use chrono::{DateTime, TimeZone, Utc};
use cucumber::World;
use split_payment_engine::{
    db_types::{Cents, Maker, Order},
    ReconcileOutcome,
    SweepReport,
};

use crate::support::Marketplace;

#[derive(Default, World)]
pub struct SettlementWorld {
    pub market: Option<Marketplace>,
    pub orders: HashMap<String, Order>,
    pub paid_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<ReconcileOutcome>,
    pub last_sweep: Option<SweepReport>,
}

impl Debug for SettlementWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SettlementWorld ({} orders)", self.orders.len())
    }
}

impl SettlementWorld {
    pub fn market(&self) -> &Marketplace {
        self.market.as_ref().expect("Marketplace not initialised")
    }

    pub fn order(&self, number: &str) -> &Order {
        self.orders.get(number).unwrap_or_else(|| panic!("Unknown order {number}"))
    }

    pub fn maker(&self, name: &str) -> &Maker {
        match name {
            "Ann" => &self.market().maker_a,
            "Ben" => &self.market().maker_b,
            _ => panic!("Unknown maker {name}"),
        }
    }

    pub fn paid_at(&self) -> DateTime<Utc> {
        self.paid_at.unwrap_or_else(|| Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap())
    }
}

/// Parses "42.50" into minor units.
pub fn parse_amount(s: &str) -> Cents {
    let (major, minor) = s.split_once('.').unwrap_or((s, "0"));
    let major = major.parse::<i64>().expect("Invalid amount");
    let minor = format!("{minor:0<2}")[..2].parse::<i64>().expect("Invalid amount");
    Cents::from(major * 100 + minor)
}
