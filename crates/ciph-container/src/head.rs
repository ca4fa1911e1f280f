//! Head block: the root descriptor of a container
//!
//! ```text
//! ┌─────────┬──────────────┐  plaintext
//! │ version │ content type │
//! ├─────────┴──────────────┤  AES-256-CTR (container key, IV = salt)
//! │ chat key         32    │
//! │ meta length      u32   │
//! │ meta blocks      u16   │  always 0
//! │ meta             gzip JSON
//! │ data length      u64   │
//! │ data blocks      u32   │
//! │ data             inline bytes, or 65 bytes per block:
//! │                  size u8 | id A 16 | id B 16 | key 32
//! │ digest           32    │  SHA-256(prefix ‖ every field above)
//! │ padding          random, up to the block size
//! └────────────────────────┘
//! ```
//!
//! Integers are big-endian. Any failure after decryption is reported as
//! `HeadDigest`, whether it is a wrong password or a damaged block.

use bytes::Bytes;
use ciph_core::{BlockId, BlockRef, BlockSize, CiphError, CiphResult, ContentType};
use ciph_crypto::cipher::{append_random_padding, apply_keystream};
use ciph_crypto::{derive_key, sha256_parts, BlockKey, ContainerKey, KEY_SIZE, SALT_SIZE};
use secrecy::SecretString;

use crate::codec::{ByteReader, ByteWriter};
use crate::meta::ContainerMeta;

pub const HEAD_VERSION: u8 = 1;
pub const PREFIX_LEN: usize = 2;
pub const CHAT_KEY_LEN: usize = 32;
pub const DIGEST_LEN: usize = 32;
/// size rank + two block IDs + block key
pub const BLOCK_REF_LEN: usize = 1 + 16 + 16 + KEY_SIZE;

/// Encrypted region length with no meta and no data.
pub const FIXED_LEN: usize = CHAT_KEY_LEN + 4 + 2 + 8 + 4 + DIGEST_LEN;

/// One externally stored chunk of the data stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataBlock {
    pub block_ref: BlockRef,
    pub key: BlockKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadData {
    /// The whole data stream, carried in the head itself
    Inline(Bytes),
    Blocks(Vec<DataBlock>),
}

impl HeadData {
    pub fn is_inline(&self) -> bool {
        matches!(self, HeadData::Inline(_))
    }

    fn encoded_len(&self) -> usize {
        match self {
            HeadData::Inline(data) => data.len(),
            HeadData::Blocks(blocks) => BLOCK_REF_LEN * blocks.len(),
        }
    }
}

/// Fields of a head about to be encoded. Metadata is already compressed.
#[derive(Debug)]
pub struct HeadFields<'a> {
    pub content_type: ContentType,
    pub chat_key: &'a [u8; CHAT_KEY_LEN],
    pub meta: &'a [u8],
    pub data_length: u64,
    pub data: &'a HeadData,
}

impl HeadFields<'_> {
    /// Length of the encrypted region, digest included, padding excluded.
    pub fn encoded_len(&self) -> usize {
        FIXED_LEN + self.meta.len() + self.data.encoded_len()
    }

    pub fn block_size(&self) -> CiphResult<BlockSize> {
        Ok(BlockSize::fit((PREFIX_LEN + self.encoded_len()) as u64)?.size)
    }
}

/// A parsed and verified head.
#[derive(Debug, Clone)]
pub struct Head {
    pub version: u8,
    pub content_type: ContentType,
    pub chat_key: [u8; CHAT_KEY_LEN],
    pub meta: ContainerMeta,
    pub data_length: u64,
    pub data: HeadData,
}

impl Head {
    pub fn data_blocks(&self) -> &[DataBlock] {
        match &self.data {
            HeadData::Inline(_) => &[],
            HeadData::Blocks(blocks) => blocks,
        }
    }
}

/// Encode, digest, pad and encrypt a head into one table-size block.
pub fn build_head(
    fields: &HeadFields<'_>,
    key: &ContainerKey,
    salt: &[u8; SALT_SIZE],
) -> CiphResult<Vec<u8>> {
    let region_len = fields.encoded_len();
    let size = fields.block_size()?;
    let meta_len = u32::try_from(fields.meta.len())
        .map_err(|_| CiphError::Unsupported("metadata larger than 4GiB".into()))?;
    let prefix = [HEAD_VERSION, fields.content_type.rank()];

    let mut w = ByteWriter::with_capacity(region_len);
    w.write_bytes(fields.chat_key)?;
    w.write_u32(meta_len)?;
    w.write_u16(0)?;
    w.write_bytes(fields.meta)?;
    w.write_u64(fields.data_length)?;
    match fields.data {
        HeadData::Inline(data) => {
            if data.len() as u64 != fields.data_length {
                return Err(CiphError::Encoding(format!(
                    "inline data is {} bytes, data length says {}",
                    data.len(),
                    fields.data_length
                )));
            }
            w.write_u32(0)?;
            w.write_bytes(data)?;
        }
        HeadData::Blocks(blocks) => {
            let count = u32::try_from(blocks.len())
                .map_err(|_| CiphError::Encoding("too many data blocks".into()))?;
            w.write_u32(count)?;
            for block in blocks {
                w.write_u8(block.block_ref.size.rank())?;
                w.write_bytes(block.block_ref.id_a().as_bytes())?;
                w.write_bytes(block.block_ref.id_b().as_bytes())?;
                w.write_bytes(block.key.as_bytes())?;
            }
        }
    }
    let digest = sha256_parts(&[&prefix, w.as_slice()]);
    w.write_bytes(&digest)?;
    let region = w.finish()?;

    let mut block = Vec::with_capacity(size.byte_len());
    block.extend_from_slice(&prefix);
    block.extend_from_slice(&region);
    append_random_padding(&mut block, size.byte_len() - PREFIX_LEN - region_len);
    apply_keystream(key.as_bytes(), salt, &mut block[PREFIX_LEN..]);

    tracing::debug!(
        size = %size,
        region_len,
        inline = fields.data.is_inline(),
        "built head block"
    );
    Ok(block)
}

/// Check the plaintext prefix against the link, derive the key and parse.
///
/// Returns the derived key alongside the head; readers need it for the
/// private container ID.
pub fn parse_head(
    block: &[u8],
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    expected: ContentType,
) -> CiphResult<(Head, ContainerKey)> {
    check_prefix(block, expected)?;
    let key = derive_key(password, salt)?;
    let head = parse_head_with_key(block, &key, salt)?;
    Ok((head, key))
}

fn check_prefix(block: &[u8], expected: ContentType) -> CiphResult<()> {
    if block.len() <= PREFIX_LEN {
        return Err(CiphError::BlockValidation(format!(
            "head block of {} bytes",
            block.len()
        )));
    }
    if block[0] != HEAD_VERSION {
        return Err(CiphError::UnsupportedVersion(block[0]));
    }
    if block[1] != expected.rank() {
        return Err(CiphError::ContentTypeMismatch {
            expected: expected.rank(),
            actual: block[1],
        });
    }
    Ok(())
}

/// Decrypt and parse a head with an already derived key.
pub fn parse_head_with_key(
    block: &[u8],
    key: &ContainerKey,
    salt: &[u8; SALT_SIZE],
) -> CiphResult<Head> {
    if block.len() <= PREFIX_LEN {
        return Err(CiphError::BlockValidation(format!(
            "head block of {} bytes",
            block.len()
        )));
    }
    if block[0] != HEAD_VERSION {
        return Err(CiphError::UnsupportedVersion(block[0]));
    }
    let content_type = ContentType::from_rank(block[1])?;

    let mut region = block[PREFIX_LEN..].to_vec();
    apply_keystream(key.as_bytes(), salt, &mut region);

    let decoded = decode_region(&block[..PREFIX_LEN], &region).map_err(|e| {
        tracing::debug!(error = %e, "head rejected");
        CiphError::HeadDigest
    })?;

    if decoded.meta_blocks > 0 {
        return Err(CiphError::Unsupported(format!(
            "head references {} meta blocks",
            decoded.meta_blocks
        )));
    }
    let meta = ContainerMeta::from_compressed(decoded.meta).map_err(|e| {
        tracing::debug!(error = %e, "head metadata rejected");
        CiphError::HeadDigest
    })?;

    Ok(Head {
        version: HEAD_VERSION,
        content_type,
        chat_key: decoded.chat_key,
        meta,
        data_length: decoded.data_length,
        data: decoded.data,
    })
}

struct DecodedRegion<'a> {
    chat_key: [u8; CHAT_KEY_LEN],
    meta_blocks: u16,
    meta: &'a [u8],
    data_length: u64,
    data: HeadData,
}

/// Parse the decrypted region and verify its digest. Every error here is
/// collapsed into `HeadDigest` by the caller.
fn decode_region<'a>(prefix: &[u8], region: &'a [u8]) -> CiphResult<DecodedRegion<'a>> {
    let mut r = ByteReader::new(region);

    let chat_key = r.read_array::<CHAT_KEY_LEN>()?;
    let meta_len = r.read_u32()? as usize;
    let meta_blocks = r.read_u16()?;
    let meta = if meta_blocks == 0 {
        r.read_bytes(meta_len)?
    } else {
        r.read_bytes(BLOCK_REF_LEN * meta_blocks as usize)?;
        &[]
    };

    let data_length = r.read_u64()?;
    let num_blocks = r.read_u32()? as usize;
    let data = if num_blocks == 0 {
        let len = usize::try_from(data_length)
            .map_err(|_| CiphError::Encoding("inline data length overflows".into()))?;
        HeadData::Inline(Bytes::copy_from_slice(r.read_bytes(len)?))
    } else {
        if num_blocks > r.remaining() / BLOCK_REF_LEN {
            return Err(CiphError::Encoding(format!("{num_blocks} data blocks")));
        }
        let mut blocks = Vec::with_capacity(num_blocks);
        for _ in 0..num_blocks {
            let size = BlockSize::from_rank(r.read_u8()?)?;
            let id_a = BlockId::from_bytes(r.read_array()?);
            let id_b = BlockId::from_bytes(r.read_array()?);
            let key = BlockKey::from_bytes(r.read_array()?);
            blocks.push(DataBlock {
                block_ref: BlockRef::new(size, id_a, id_b),
                key,
            });
        }
        HeadData::Blocks(blocks)
    };

    let expected = sha256_parts(&[prefix, r.consumed()]);
    let stored = r.read_bytes(DIGEST_LEN)?;
    if stored != expected {
        return Err(CiphError::HeadDigest);
    }

    Ok(DecodedRegion {
        chat_key,
        meta_blocks,
        meta,
        data_length,
        data,
    })
}
