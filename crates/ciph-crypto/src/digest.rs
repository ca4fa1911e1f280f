//! SHA-256 helpers and content IDs

use ciph_core::{BlockId, BLOCK_ID_LEN};
use sha2::{Digest, Sha256};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 over the concatenation of `parts`, without concatenating them.
pub fn sha256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// First 16 bytes of SHA-256 over `parts`, as 32 hex chars.
pub fn short_digest(parts: &[&[u8]]) -> String {
    hex::encode(&sha256_parts(parts)[..BLOCK_ID_LEN])
}

/// Content ID of an on-wire block.
pub fn block_id(data: &[u8]) -> BlockId {
    let mut id = [0u8; BLOCK_ID_LEN];
    id.copy_from_slice(&sha256(data)[..BLOCK_ID_LEN]);
    BlockId::from_bytes(id)
}
