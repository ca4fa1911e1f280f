//! The block network as seen by the engine

use async_trait::async_trait;
use bytes::Bytes;
use ciph_core::{BlockId, BlockSize, CiphResult};
use rand::RngCore;

/// Content-addressed storage of fixed-size blocks.
///
/// Retry and backoff belong to implementations. The engine treats any error
/// returned here as terminal for the operation in progress.
#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Fetch one block. Fails `NotFound` if no block has that ID.
    async fn get(&self, size: BlockSize, id: &BlockId) -> CiphResult<Bytes>;

    /// Fetch any existing block of `size`, to be used as a cover block.
    async fn get_random(&self, size: BlockSize) -> CiphResult<(BlockId, Bytes)>;

    /// Store one block and return its content ID.
    async fn put(&self, size: BlockSize, data: Bytes) -> CiphResult<BlockId>;
}

/// Upload `count` blocks of random bytes so `get_random` has something to
/// serve on a fresh store.
pub async fn seed_cover_blocks<S: BlockStore + ?Sized>(
    store: &S,
    size: BlockSize,
    count: usize,
) -> CiphResult<Vec<BlockId>> {
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let mut data = vec![0u8; size.byte_len()];
        rand::thread_rng().fill_bytes(&mut data);
        ids.push(store.put(size, Bytes::from(data)).await?);
    }
    tracing::debug!(size = %size, count, "seeded cover blocks");
    Ok(ids)
}
