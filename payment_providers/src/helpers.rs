use std::collections::BTreeMap;

/// Stripe takes nested objects as bracketed form keys, e.g. `metadata[order_id]=42`.
pub fn metadata_form_fields(prefix: &str, metadata: &BTreeMap<String, String>) -> Vec<(String, String)> {
    metadata.iter().map(|(k, v)| (format!("{prefix}[{k}]"), v.clone())).collect()
}
