use std::{future::Future, time::Duration};

use crate::traits::ProviderError;

/// Bounds a provider call. The call is not retried; an elapsed timeout is reported as [`ProviderError::Timeout`].
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, ProviderError>
where F: Future<Output = Result<T, ProviderError>> {
    tokio::time::timeout(timeout, call).await.unwrap_or(Err(ProviderError::Timeout))
}
