use std::collections::BTreeMap;

use regex::Regex;

use crate::db_types::Order;

pub const ORDER_ID_KEY: &str = "order_id";
pub const ORDER_NUMBER_KEY: &str = "order_number";

/// The metadata attached to every provider object created for an order, so that webhooks can be traced back to it.
pub fn order_metadata(order: &Order) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    metadata.insert(ORDER_ID_KEY.to_string(), order.id.to_string());
    metadata.insert(ORDER_NUMBER_KEY.to_string(), order.order_number.clone());
    metadata
}

pub fn order_id_from_metadata(metadata: &BTreeMap<String, String>) -> Option<i64> {
    metadata.get(ORDER_ID_KEY).and_then(|s| s.trim().parse::<i64>().ok())
}

/// Payment reference for providers that only carry a free-text reference, e.g. `SPG-0042 [order 17]`.
pub fn order_reference(order_number: &str, order_id: i64) -> String {
    format!("{order_number} [order {order_id}]")
}

pub fn order_id_from_reference(reference: &str) -> Option<i64> {
    let re = Regex::new(r"\[order (\d+)\]").ok()?;
    re.captures(reference).and_then(|c| c.get(1)).and_then(|m| m.as_str().parse().ok())
}
