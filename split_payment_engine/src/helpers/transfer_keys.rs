//! Deterministic idempotency keys for transfers. Submitting the same key twice makes the provider return the original
//! transfer instead of moving money again.
use std::collections::BTreeMap;

pub fn disbursement_key(order_id: i64, maker_id: i64) -> String {
    format!("disburse-{order_id}-{maker_id}")
}

/// Key for a retry after a definite rejection. Reusing the rejected key would make the provider replay the rejection.
/// Attempts with an unknown outcome are retried under their original key instead.
pub fn retry_key(order_id: i64, maker_id: i64, attempt: i64) -> String {
    format!("disburse-{order_id}-{maker_id}-retry{attempt}")
}

const MAX_KEY_LEN: usize = 255;

pub fn reserve_release_key(ledger_row_ids: &[i64]) -> String {
    let mut ids = ledger_row_ids.to_vec();
    ids.sort_unstable();
    let key = format!("reserve-{}", ids.iter().map(i64::to_string).collect::<Vec<_>>().join("-"));
    if key.len() <= MAX_KEY_LEN {
        return key;
    }
    // Providers cap key length. Summarise large groups by their bounds, size and id sum.
    let first = ids.first().copied().unwrap_or_default();
    let last = ids.last().copied().unwrap_or_default();
    let sum = ids.iter().fold(0i64, |acc, id| acc.wrapping_add(*id));
    format!("reserve-{first}-{last}-n{}-s{sum}", ids.len())
}

pub fn transfer_metadata(order_id: Option<i64>, ledger_row_ids: &[i64]) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();
    if let Some(id) = order_id {
        metadata.insert("order_id".to_string(), id.to_string());
    }
    if !ledger_row_ids.is_empty() {
        let ids = ledger_row_ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
        metadata.insert("ledger_row_ids".to_string(), ids);
    }
    metadata
}
