//! Shared fixtures: in-memory block stores seeded with cover blocks

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use ciph_core::{BlockId, BlockSize, CiphError, CiphResult};
use ciph_storage::{seed_cover_blocks, BlockStore, OperatorBlockStore};
use opendal::Operator;

pub fn memory_operator() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

/// A fresh store with two cover blocks of each size in `sizes`.
pub async fn seeded_store(sizes: &[BlockSize]) -> Arc<OperatorBlockStore> {
    let store = OperatorBlockStore::new(memory_operator());
    for &size in sizes {
        seed_cover_blocks(&store, size, 2)
            .await
            .expect("seed cover blocks");
    }
    Arc::new(store)
}

/// Counts calls through to an inner store.
pub struct CountingStore {
    pub inner: Arc<OperatorBlockStore>,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: Arc<OperatorBlockStore>) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.gets.load(Ordering::SeqCst) + self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockStore for CountingStore {
    async fn get(&self, size: BlockSize, id: &BlockId) -> CiphResult<Bytes> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(size, id).await
    }

    async fn get_random(&self, size: BlockSize) -> CiphResult<(BlockId, Bytes)> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_random(size).await
    }

    async fn put(&self, size: BlockSize, data: Bytes) -> CiphResult<BlockId> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(size, data).await
    }
}

/// Serves reads but never completes a write.
pub struct StalledStore {
    pub inner: Arc<OperatorBlockStore>,
}

#[async_trait]
impl BlockStore for StalledStore {
    async fn get(&self, size: BlockSize, id: &BlockId) -> CiphResult<Bytes> {
        self.inner.get(size, id).await
    }

    async fn get_random(&self, size: BlockSize) -> CiphResult<(BlockId, Bytes)> {
        self.inner.get_random(size).await
    }

    async fn put(&self, _size: BlockSize, _data: Bytes) -> CiphResult<BlockId> {
        std::future::pending().await
    }
}

/// Passes reads through; writes succeed only while the budget lasts.
pub struct FlakyStore {
    pub inner: Arc<OperatorBlockStore>,
    puts_left: AtomicUsize,
}

impl FlakyStore {
    pub fn new(inner: Arc<OperatorBlockStore>) -> Self {
        Self {
            inner,
            puts_left: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn fail_puts(&self) {
        self.puts_left.store(0, Ordering::SeqCst);
    }

    pub fn allow_puts(&self, n: usize) {
        self.puts_left.store(n, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.allow_puts(usize::MAX);
    }
}

#[async_trait]
impl BlockStore for FlakyStore {
    async fn get(&self, size: BlockSize, id: &BlockId) -> CiphResult<Bytes> {
        self.inner.get(size, id).await
    }

    async fn get_random(&self, size: BlockSize) -> CiphResult<(BlockId, Bytes)> {
        self.inner.get_random(size).await
    }

    async fn put(&self, size: BlockSize, data: Bytes) -> CiphResult<BlockId> {
        self.puts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| CiphError::Transport("put refused".into()))?;
        self.inner.put(size, data).await
    }
}

/// Deterministic, non-repeating test payload.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed) ^ (i >> 8) as u8)
        .collect()
}
