//! Storage health check

use ciph_core::{BlockSize, CiphError, CiphResult};

use crate::operator::OperatorBlockStore;

/// Verify the storage endpoint is reachable and report how many cover blocks
/// each size has. A size with none cannot be published to.
pub async fn check_health(store: &OperatorBlockStore) -> CiphResult<Vec<(BlockSize, usize)>> {
    store
        .operator()
        .list("/")
        .await
        .map_err(|e| CiphError::Transport(format!("storage health check failed: {e}")))?;

    let mut counts = Vec::with_capacity(BlockSize::ALL.len());
    for size in BlockSize::ALL {
        let count = store.count(size).await?;
        if count == 0 {
            tracing::warn!(size = %size, "no cover blocks available");
        }
        counts.push((size, count));
    }
    Ok(counts)
}

/// Returns true if storage is reachable, false otherwise (non-panicking)
pub async fn is_healthy(store: &OperatorBlockStore) -> bool {
    check_health(store).await.is_ok()
}
