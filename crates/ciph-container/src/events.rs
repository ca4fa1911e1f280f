//! Progress events emitted while a container is built and published

use ciph_core::{BlockRef, BlockSize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerEvent {
    /// All bytes of a file were queued (some may already be published)
    FileIngested { name: String, length: u64 },
    /// A data block was mixed and stored
    BlockPublished { index: usize, block_ref: BlockRef },
    /// The head block was stored; the container is addressable
    HeadPublished { size: BlockSize, public_id: String },
}

/// Event sink supplied by the caller.
pub type EventFn = Box<dyn Fn(&ContainerEvent) + Send + Sync>;
