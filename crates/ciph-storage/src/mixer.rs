//! Cover-block mixing
//!
//! A ciphertext block is never uploaded as is. It is XORed with a random
//! existing block of the same size and only the result is stored, so the
//! published pair `(cover, mixed)` is needed to recover the ciphertext.

use bytes::Bytes;
use ciph_core::{BlockId, BlockRef, BlockSize, CiphError, CiphResult};
use rand::Rng;

use crate::store::BlockStore;

/// Mix `ciphertext` with a random cover block and publish the result.
///
/// The two IDs of the returned reference are in random order.
pub async fn publish<S: BlockStore + ?Sized>(store: &S, ciphertext: &[u8]) -> CiphResult<BlockRef> {
    let size = BlockSize::from_bytes(ciphertext.len() as u64)?;
    let (cover_id, cover) = store.get_random(size).await?;
    check_block(size, &cover_id, &cover)?;

    let mixed = ciph_crypto::xor(ciphertext, &cover)?;
    let expected_id = ciph_crypto::block_id(&mixed);
    let mixed_id = store.put(size, Bytes::from(mixed)).await?;
    if mixed_id != expected_id {
        return Err(CiphError::BlockValidation(format!(
            "store returned id {mixed_id}, content hashes to {expected_id}"
        )));
    }

    let block_ref = if rand::thread_rng().gen::<bool>() {
        BlockRef::new(size, cover_id, mixed_id)
    } else {
        BlockRef::new(size, mixed_id, cover_id)
    };
    tracing::debug!(size = %size, id_a = %block_ref.ids[0], id_b = %block_ref.ids[1], "published block");
    Ok(block_ref)
}

/// Fetch both blocks of `block_ref` and XOR them back into the ciphertext.
pub async fn recombine<S: BlockStore + ?Sized>(store: &S, block_ref: &BlockRef) -> CiphResult<Vec<u8>> {
    let size = block_ref.size;
    let (a, b) = tokio::try_join!(
        store.get(size, block_ref.id_a()),
        store.get(size, block_ref.id_b()),
    )?;
    if a.len() != b.len() {
        return Err(CiphError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    check_block(size, block_ref.id_a(), &a)?;
    check_block(size, block_ref.id_b(), &b)?;

    ciph_crypto::xor(&a, &b)
}

/// A fetched block must be exactly `size` long and hash to its ID.
fn check_block(size: BlockSize, id: &BlockId, data: &[u8]) -> CiphResult<()> {
    if data.len() != size.byte_len() {
        return Err(CiphError::BlockValidation(format!(
            "block {id}: {} bytes, expected {size}",
            data.len()
        )));
    }
    let actual = ciph_crypto::block_id(data);
    if actual != *id {
        return Err(CiphError::BlockValidation(format!(
            "block {id}: content hashes to {actual}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorBlockStore;
    use crate::store::seed_cover_blocks;
    use ciph_core::config::StorageConfig;

    async fn seeded_store() -> OperatorBlockStore {
        let store = OperatorBlockStore::from_config(&StorageConfig::default(), None).unwrap();
        seed_cover_blocks(&store, BlockSize::Kib4, 4).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_publish_recombine_roundtrip() {
        let store = seeded_store().await;
        let ciphertext: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();

        let block_ref = publish(&store, &ciphertext).await.unwrap();
        assert_eq!(block_ref.size, BlockSize::Kib4);
        assert_ne!(block_ref.ids[0], block_ref.ids[1]);
        assert_eq!(recombine(&store, &block_ref).await.unwrap(), ciphertext);
    }

    #[tokio::test]
    async fn test_recombine_ignores_id_order() {
        let store = seeded_store().await;
        let ciphertext = vec![0x5Au8; 4096];
        let r = publish(&store, &ciphertext).await.unwrap();
        let swapped = BlockRef::new(r.size, r.ids[1], r.ids[0]);
        assert_eq!(recombine(&store, &swapped).await.unwrap(), ciphertext);
    }

    #[tokio::test]
    async fn test_stored_block_is_not_the_ciphertext() {
        let store = seeded_store().await;
        let ciphertext = vec![0x11u8; 4096];
        let r = publish(&store, &ciphertext).await.unwrap();
        for id in &r.ids {
            let stored = store.get(BlockSize::Kib4, id).await.unwrap();
            assert_ne!(&stored[..], &ciphertext[..]);
        }
    }

    #[tokio::test]
    async fn test_publish_rejects_non_table_length() {
        let store = seeded_store().await;
        let result = publish(&store, &[0u8; 5000]).await;
        assert!(matches!(result, Err(CiphError::InvalidBlockSize(_))));
    }

    #[tokio::test]
    async fn test_recombine_detects_wrong_size_ref() {
        let store = seeded_store().await;
        let r = publish(&store, &[1u8; 4096]).await.unwrap();
        // Same IDs under another size directory do not exist
        let wrong = BlockRef::new(BlockSize::Kib16, r.ids[0], r.ids[1]);
        assert!(matches!(
            recombine(&store, &wrong).await,
            Err(CiphError::NotFound(_))
        ));
    }
}
