//! Standard block sizes and the padding/splitting policy
//!
//! Every block on the network is exactly one of seven sizes. Payloads
//! shorter than their block are padded with random tail bytes, so the table
//! below is the only length granularity an observer ever sees.
//!
//! ```text
//! rank  0     1      2      3       4     5     6
//! size  4KiB  16KiB  64KiB  256KiB  1MiB  4MiB  16MiB
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{CiphError, CiphResult};

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;

/// Minimum saving for a two-block plan to be recommended over one block.
pub const PAIR_SAVINGS_THRESHOLD: i64 = 16 * KIB as i64;

/// Blocks at least this large are candidates for splitting...
pub const SPLIT_BLOCK_BYTES: u64 = 256 * KIB;
/// ...when at least this much of them would be padding.
pub const SPLIT_BLOCK_PAD: u64 = 64 * KIB;

/// A standard block size, identified on the wire by its rank (0..=6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum BlockSize {
    Kib4 = 0,
    Kib16 = 1,
    Kib64 = 2,
    Kib256 = 3,
    Mib1 = 4,
    Mib4 = 5,
    Mib16 = 6,
}

impl BlockSize {
    pub const ALL: [BlockSize; 7] = [
        BlockSize::Kib4,
        BlockSize::Kib16,
        BlockSize::Kib64,
        BlockSize::Kib256,
        BlockSize::Mib1,
        BlockSize::Mib4,
        BlockSize::Mib16,
    ];

    pub const MIN: BlockSize = BlockSize::Kib4;
    pub const MAX: BlockSize = BlockSize::Mib16;

    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn from_rank(rank: u8) -> CiphResult<Self> {
        Self::ALL
            .get(rank as usize)
            .copied()
            .ok_or_else(|| CiphError::InvalidBlockSize(format!("rank {rank}")))
    }

    /// Length in bytes of a block of this size (padding included).
    pub fn bytes(self) -> u64 {
        match self {
            BlockSize::Kib4 => 4 * KIB,
            BlockSize::Kib16 => 16 * KIB,
            BlockSize::Kib64 => 64 * KIB,
            BlockSize::Kib256 => 256 * KIB,
            BlockSize::Mib1 => MIB,
            BlockSize::Mib4 => 4 * MIB,
            BlockSize::Mib16 => 16 * MIB,
        }
    }

    pub fn byte_len(self) -> usize {
        self.bytes() as usize
    }

    /// Exact-match lookup. Used to validate blocks fetched from the network.
    pub fn from_bytes(bytes: u64) -> CiphResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.bytes() == bytes)
            .ok_or_else(|| CiphError::InvalidBlockSize(format!("{bytes} bytes")))
    }

    /// Smallest block that holds `length` bytes, and the padding it needs.
    pub fn fit(length: u64) -> CiphResult<SizeFit> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| length <= s.bytes())
            .map(|size| SizeFit {
                size,
                pad: size.bytes() - length,
            })
            .ok_or(CiphError::Oversize(length))
    }

    /// Best fit for `length` as one block or as two adjacent table sizes.
    ///
    /// The pair is only recommended when it saves at least
    /// [`PAIR_SAVINGS_THRESHOLD`]; every extra block costs a reference in the
    /// head and two more round trips on read.
    pub fn plan(length: u64) -> CiphResult<BlockPlan> {
        let single = Self::fit(length)?.size;

        let pair = Self::ALL
            .windows(2)
            .find(|w| w[0].bytes() + w[1].bytes() >= length)
            .map(|w| (w[0], w[1]));

        let savings = match pair {
            Some((a, b)) => single.bytes() as i64 - (a.bytes() + b.bytes()) as i64,
            None => 0,
        };

        Ok(BlockPlan {
            single,
            pair,
            savings,
            recommend_pair: pair.is_some() && savings >= PAIR_SAVINGS_THRESHOLD,
        })
    }

    pub fn smaller(self) -> Option<Self> {
        self.rank().checked_sub(1).and_then(|r| Self::from_rank(r).ok())
    }

    pub fn larger(self) -> Option<Self> {
        Self::from_rank(self.rank() + 1).ok()
    }
}

impl From<BlockSize> for u8 {
    fn from(size: BlockSize) -> u8 {
        size.rank()
    }
}

impl TryFrom<u8> for BlockSize {
    type Error = CiphError;

    fn try_from(rank: u8) -> CiphResult<Self> {
        Self::from_rank(rank)
    }
}

impl std::fmt::Display for BlockSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.bytes();
        if bytes >= MIB {
            write!(f, "{}MiB", bytes / MIB)
        } else {
            write!(f, "{}KiB", bytes / KIB)
        }
    }
}

/// Result of [`BlockSize::fit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeFit {
    pub size: BlockSize,
    /// Random tail bytes needed to reach `size.bytes()`
    pub pad: u64,
}

impl SizeFit {
    pub fn bytes(&self) -> u64 {
        self.size.bytes()
    }

    /// Large, mostly empty blocks are not worth publishing whole.
    pub fn should_split(&self) -> bool {
        self.bytes() >= SPLIT_BLOCK_BYTES && self.pad >= SPLIT_BLOCK_PAD
    }
}

/// Result of [`BlockSize::plan`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockPlan {
    pub single: BlockSize,
    /// Two adjacent sizes whose combined capacity covers the length
    pub pair: Option<(BlockSize, BlockSize)>,
    /// `single - (pair.0 + pair.1)` in bytes; negative when the pair is larger
    pub savings: i64,
    pub recommend_pair: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn fit_picks_smallest_covering_size() {
        assert_eq!(BlockSize::fit(1).unwrap().size, BlockSize::Kib4);
        assert_eq!(BlockSize::fit(4 * KIB).unwrap().size, BlockSize::Kib4);
        assert_eq!(BlockSize::fit(4 * KIB + 1).unwrap().size, BlockSize::Kib16);
        assert_eq!(BlockSize::fit(16 * MIB).unwrap().pad, 0);
    }

    #[test]
    fn fit_rejects_oversize() {
        assert!(matches!(
            BlockSize::fit(16 * MIB + 1),
            Err(CiphError::Oversize(_))
        ));
    }

    #[test]
    fn from_bytes_requires_exact_match() {
        assert_eq!(BlockSize::from_bytes(MIB).unwrap(), BlockSize::Mib1);
        assert!(matches!(
            BlockSize::from_bytes(MIB + 1),
            Err(CiphError::InvalidBlockSize(_))
        ));
    }

    #[test]
    fn rank_roundtrip() {
        for size in BlockSize::ALL {
            assert_eq!(BlockSize::from_rank(size.rank()).unwrap(), size);
        }
        assert!(BlockSize::from_rank(7).is_err());
    }

    #[test]
    fn plan_one_and_a_half_mib_prefers_single() {
        let plan = BlockSize::plan(3 * MIB / 2).unwrap();
        assert_eq!(plan.single, BlockSize::Mib4);
        assert_eq!(plan.pair, Some((BlockSize::Mib1, BlockSize::Mib4)));
        assert!(!plan.recommend_pair);
    }

    #[test]
    fn plan_just_under_pair_boundary_recommends_pair() {
        // 256KiB + 1MiB covers it and is far smaller than a 4MiB block
        let plan = BlockSize::plan(MIB + 200 * KIB).unwrap();
        assert_eq!(plan.single, BlockSize::Mib4);
        assert_eq!(plan.pair, Some((BlockSize::Kib256, BlockSize::Mib1)));
        assert!(plan.recommend_pair);
        assert_eq!(plan.savings, (4 * MIB - MIB - 256 * KIB) as i64);
    }

    #[test]
    fn plan_small_savings_below_threshold() {
        // 4KiB + 16KiB = 20KiB vs 64KiB single: saves 44KiB, recommended
        assert!(BlockSize::plan(17 * KIB).unwrap().recommend_pair);
        // 16KiB + 64KiB vs 64KiB single: pair is larger
        assert!(!BlockSize::plan(21 * KIB).unwrap().recommend_pair);
    }

    #[test]
    fn should_split_thresholds() {
        let fit = BlockSize::fit(100 * KIB).unwrap(); // 256KiB, pad 156KiB
        assert!(fit.should_split());
        let fit = BlockSize::fit(200 * KIB).unwrap(); // 256KiB, pad 56KiB
        assert!(!fit.should_split());
        let fit = BlockSize::fit(10 * KIB).unwrap(); // 16KiB, too small
        assert!(!fit.should_split());
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(BlockSize::Kib256.to_string(), "256KiB");
        assert_eq!(BlockSize::Mib16.to_string(), "16MiB");
    }

    proptest! {
        #[test]
        fn fit_is_smallest_and_pad_consistent(len in 1u64..=16 * MIB) {
            let fit = BlockSize::fit(len).unwrap();
            prop_assert!(fit.bytes() >= len);
            prop_assert_eq!(fit.bytes() - len, fit.pad);
            if let Some(smaller) = fit.size.smaller() {
                prop_assert!(smaller.bytes() < len);
            }
        }

        #[test]
        fn fit_fails_above_max(len in (16 * MIB + 1)..=(64 * MIB)) {
            prop_assert!(matches!(BlockSize::fit(len), Err(CiphError::Oversize(_))));
        }
    }
}
