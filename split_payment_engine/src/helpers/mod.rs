mod order_reference;
mod provider_calls;
mod transfer_keys;

pub use order_reference::{order_id_from_metadata, order_id_from_reference, order_metadata, order_reference};
pub use provider_calls::with_timeout;
pub use transfer_keys::{disbursement_key, reserve_release_key, retry_key, transfer_metadata};
