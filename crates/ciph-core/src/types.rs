use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::block::BlockSize;
use crate::error::{CiphError, CiphResult};

/// Length of a block content ID: the first 16 bytes of SHA-256.
pub const BLOCK_ID_LEN: usize = 16;

/// Content ID of an on-wire block, displayed as 32 lowercase hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BlockId([u8; BLOCK_ID_LEN]);

impl BlockId {
    pub fn from_bytes(bytes: [u8; BLOCK_ID_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> CiphResult<Self> {
        let arr: [u8; BLOCK_ID_LEN] = bytes.try_into().map_err(|_| {
            CiphError::InvalidHex(format!(
                "block id must be {BLOCK_ID_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; BLOCK_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for BlockId {
    type Err = CiphError;

    fn from_str(s: &str) -> CiphResult<Self> {
        parse_hex16(s).map(Self)
    }
}

impl TryFrom<String> for BlockId {
    type Error = CiphError;

    fn try_from(s: String) -> CiphResult<Self> {
        s.parse()
    }
}

impl From<BlockId> for String {
    fn from(id: BlockId) -> String {
        id.to_hex()
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockId({})", self.to_hex())
    }
}

/// Parse exactly 32 lowercase hex chars into 16 bytes.
pub fn parse_hex16(s: &str) -> CiphResult<[u8; 16]> {
    if s.len() != 32 || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(CiphError::InvalidHex(format!(
            "expected 32 lowercase hex chars: {s:?}"
        )));
    }
    let mut out = [0u8; 16];
    hex::decode_to_slice(s, &mut out).map_err(|e| CiphError::InvalidHex(e.to_string()))?;
    Ok(out)
}

/// The two blocks whose XOR reconstructs one plaintext block.
///
/// The order of `ids` is randomized at publish time and carries no meaning;
/// readers fetch both and XOR, which is commutative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub size: BlockSize,
    pub ids: [BlockId; 2],
}

impl BlockRef {
    pub fn new(size: BlockSize, id_a: BlockId, id_b: BlockId) -> Self {
        Self {
            size,
            ids: [id_a, id_b],
        }
    }

    pub fn id_a(&self) -> &BlockId {
        &self.ids[0]
    }

    pub fn id_b(&self) -> &BlockId {
        &self.ids[1]
    }

    /// Same pair of blocks, regardless of order.
    pub fn same_pair(&self, other: &BlockRef) -> bool {
        self.size == other.size
            && (self.ids == other.ids || (self.ids[0] == other.ids[1] && self.ids[1] == other.ids[0]))
    }
}

/// What a container holds. The rank is written unencrypted into every head.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ContentType {
    Collection = 0,
    Page = 1,
    Video = 2,
    Audio = 3,
    Image = 4,
}

impl ContentType {
    pub const ALL: [ContentType; 5] = [
        ContentType::Collection,
        ContentType::Page,
        ContentType::Video,
        ContentType::Audio,
        ContentType::Image,
    ];

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn from_rank(rank: u8) -> CiphResult<Self> {
        Self::ALL
            .get(rank as usize)
            .copied()
            .ok_or_else(|| CiphError::InvalidContentType(rank.to_string()))
    }

    pub fn name(self) -> &'static str {
        match self {
            ContentType::Collection => "collection",
            ContentType::Page => "page",
            ContentType::Video => "video",
            ContentType::Audio => "audio",
            ContentType::Image => "image",
        }
    }
}

impl FromStr for ContentType {
    type Err = CiphError;

    fn from_str(s: &str) -> CiphResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| CiphError::InvalidContentType(s.to_string()))
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
