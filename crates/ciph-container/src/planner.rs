//! Queue of pending data and the rules for cutting it into blocks
//!
//! The queue holds `Bytes` handles, so cutting a block only copies when a
//! block spans more than one queued buffer.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use ciph_core::{BlockPlan, BlockSize, CiphError, CiphResult};

#[derive(Debug, Default)]
pub struct DataPlanner {
    queue: VecDeque<Bytes>,
    queued: u64,
}

impl DataPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        self.queued += data.len() as u64;
        self.queue.push_back(data);
    }

    pub fn queued_len(&self) -> u64 {
        self.queued
    }

    pub fn is_empty(&self) -> bool {
        self.queued == 0
    }

    pub fn should_flush(&self, threshold: u64) -> bool {
        self.queued > threshold
    }

    pub fn plan_for_remaining(&self) -> CiphResult<BlockPlan> {
        BlockSize::plan(self.queued)
    }

    /// Remove exactly `n` bytes from the front of the queue.
    ///
    /// A buffer straddling the boundary is split and its tail stays queued.
    pub fn take_exactly(&mut self, n: u64) -> CiphResult<Bytes> {
        if n > self.queued {
            return Err(CiphError::InsufficientData {
                wanted: n,
                available: self.queued,
            });
        }
        let n_usize = n as usize;

        // Fast path: the front buffer alone covers the request
        if let Some(front) = self.queue.front_mut() {
            if front.len() >= n_usize {
                let out = front.split_to(n_usize);
                if front.is_empty() {
                    self.queue.pop_front();
                }
                self.queued -= n;
                return Ok(out);
            }
        }

        let mut out = BytesMut::with_capacity(n_usize);
        while out.len() < n_usize {
            let Some(mut buf) = self.queue.pop_front() else {
                break;
            };
            let want = n_usize - out.len();
            if buf.len() > want {
                out.extend_from_slice(&buf.split_to(want));
                self.queue.push_front(buf);
            } else {
                out.extend_from_slice(&buf);
            }
        }
        self.queued -= n;
        Ok(out.freeze())
    }

    pub fn take_all(&mut self) -> Bytes {
        match self.take_exactly(self.queued) {
            Ok(all) => all,
            Err(_) => Bytes::new(),
        }
    }

    /// Everything queued, as one buffer, without dequeuing it.
    pub fn snapshot(&self) -> Bytes {
        match self.queue.len() {
            0 => Bytes::new(),
            1 => self.queue[0].clone(),
            _ => {
                let mut out = BytesMut::with_capacity(self.queued as usize);
                for buf in &self.queue {
                    out.extend_from_slice(buf);
                }
                out.freeze()
            }
        }
    }

    /// Put cuts back at the front of the queue, in their original order.
    pub fn restore(&mut self, cuts: Vec<Bytes>) {
        for cut in cuts.into_iter().rev() {
            if cut.is_empty() {
                continue;
            }
            self.queued += cut.len() as u64;
            self.queue.push_front(cut);
        }
    }

    /// Drop bytes from the back of the queue until `len` remain.
    pub fn truncate(&mut self, len: u64) {
        while self.queued > len {
            let Some(mut last) = self.queue.pop_back() else {
                break;
            };
            let excess = self.queued - len;
            if last.len() as u64 > excess {
                last.truncate(last.len() - excess as usize);
                self.queued = len;
                self.queue.push_back(last);
            } else {
                self.queued -= last.len() as u64;
            }
        }
    }

    /// Cut as many full `size` blocks as the queue holds.
    pub fn take_full_blocks(&mut self, size: BlockSize) -> CiphResult<Vec<Bytes>> {
        let mut cuts = Vec::new();
        while self.queued >= size.bytes() {
            cuts.push(self.take_exactly(size.bytes())?);
        }
        Ok(cuts)
    }

    /// Cut everything that is queued.
    ///
    /// Every cut except the last fills its block exactly; the last is the
    /// best fit for what remains and will be padded.
    pub fn drain(&mut self) -> CiphResult<Vec<Bytes>> {
        let mut cuts = Vec::new();
        while !self.is_empty() {
            let len = next_cut(self.queued)?;
            cuts.push(self.take_exactly(len)?);
        }
        Ok(cuts)
    }
}

/// Length of the next block to cut when `remaining` bytes must all be
/// published.
pub fn next_cut(remaining: u64) -> CiphResult<u64> {
    if remaining > BlockSize::MAX.bytes() {
        return Ok(BlockSize::MAX.bytes());
    }

    // Two adjacent sizes beat one mostly empty block: fill the larger one
    // now, the rest fits the smaller one
    let plan = BlockSize::plan(remaining)?;
    if let (true, Some((_, larger))) = (plan.recommend_pair, plan.pair) {
        return Ok(larger.bytes());
    }

    let fit = BlockSize::fit(remaining)?;
    if fit.should_split() {
        if let Some(smaller) = fit.size.smaller() {
            return Ok(smaller.bytes());
        }
    }
    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciph_core::block::{KIB, MIB};
    use proptest::prelude::*;

    fn planner_with(bufs: &[&[u8]]) -> DataPlanner {
        let mut p = DataPlanner::new();
        for b in bufs {
            p.append(Bytes::copy_from_slice(b));
        }
        p
    }

    #[test]
    fn test_take_exactly_splits_boundary_buffer() {
        let mut p = planner_with(&[b"abc", b"defg", b"hi"]);
        assert_eq!(p.queued_len(), 9);

        assert_eq!(&p.take_exactly(2).unwrap()[..], b"ab");
        assert_eq!(&p.take_exactly(4).unwrap()[..], b"cdef");
        assert_eq!(p.queued_len(), 3);
        assert_eq!(&p.snapshot()[..], b"ghi");
        assert_eq!(p.queued_len(), 3);
        assert_eq!(&p.take_all()[..], b"ghi");
        assert!(p.is_empty());
    }

    #[test]
    fn test_take_exactly_insufficient() {
        let mut p = planner_with(&[b"abc"]);
        assert!(matches!(
            p.take_exactly(4),
            Err(CiphError::InsufficientData {
                wanted: 4,
                available: 3
            })
        ));
        assert_eq!(p.queued_len(), 3);
    }

    #[test]
    fn test_should_flush_is_strict() {
        let p = planner_with(&[&[0u8; 10]]);
        assert!(!p.should_flush(10));
        assert!(p.should_flush(9));
    }

    #[test]
    fn test_restore_puts_cuts_back_in_order() {
        let mut p = planner_with(&[b"abcdef", b"gh"]);
        let cuts = vec![p.take_exactly(2).unwrap(), p.take_exactly(3).unwrap()];
        assert_eq!(p.queued_len(), 3);

        p.restore(cuts);
        assert_eq!(p.queued_len(), 8);
        assert_eq!(&p.take_all()[..], b"abcdefgh");
    }

    #[test]
    fn test_truncate_drops_from_the_back() {
        let mut p = planner_with(&[b"abc", b"defg", b"hi"]);
        p.truncate(5);
        assert_eq!(p.queued_len(), 5);
        assert_eq!(&p.snapshot()[..], b"abcde");

        p.truncate(9);
        assert_eq!(p.queued_len(), 5);
        p.truncate(0);
        assert!(p.is_empty());
    }

    #[test]
    fn test_full_blocks_leave_remainder() {
        let mut p = DataPlanner::new();
        p.append(Bytes::from(vec![1u8; 10 * 1024]));
        let cuts = p.take_full_blocks(BlockSize::Kib4).unwrap();
        assert_eq!(cuts.len(), 2);
        assert!(cuts.iter().all(|c| c.len() == 4096));
        assert_eq!(p.queued_len(), 2048);
    }

    #[test]
    fn test_next_cut_small_remainder_is_single_block() {
        assert_eq!(next_cut(9).unwrap(), 9);
        assert_eq!(next_cut(48 * KIB).unwrap(), 48 * KIB);
    }

    #[test]
    fn test_next_cut_uses_recommended_pair() {
        // 1MiB + 256KiB instead of a 4MiB block
        assert_eq!(next_cut(MIB + 200 * KIB).unwrap(), MIB);
        assert_eq!(next_cut(200 * KIB).unwrap(), 200 * KIB);
    }

    #[test]
    fn test_next_cut_splits_near_empty_block() {
        // 100KiB would sit in a 256KiB block with 156KiB of padding
        assert_eq!(next_cut(100 * KIB).unwrap(), 64 * KIB);
    }

    #[test]
    fn test_next_cut_above_max() {
        assert_eq!(next_cut(40 * MIB).unwrap(), 16 * MIB);
    }

    #[test]
    fn test_drain_fills_every_block_but_the_last() {
        let mut p = DataPlanner::new();
        p.append(Bytes::from(vec![0u8; (5 * MIB + 123) as usize]));
        let cuts = p.drain().unwrap();
        let (last, rest) = cuts.split_last().unwrap();
        for cut in rest {
            assert!(BlockSize::from_bytes(cut.len() as u64).is_ok());
        }
        assert!(BlockSize::fit(last.len() as u64).is_ok());
        assert_eq!(cuts.iter().map(|c| c.len() as u64).sum::<u64>(), 5 * MIB + 123);
    }

    proptest! {
        #[test]
        fn take_exactly_conserves_bytes(
            bufs in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..16),
            takes in proptest::collection::vec(0u64..100, 0..16),
        ) {
            let mut p = DataPlanner::new();
            let mut expected = Vec::new();
            for b in &bufs {
                expected.extend_from_slice(b);
                p.append(Bytes::from(b.clone()));
            }

            let mut got = Vec::new();
            for n in takes {
                match p.take_exactly(n) {
                    Ok(chunk) => {
                        prop_assert_eq!(chunk.len() as u64, n);
                        got.extend_from_slice(&chunk);
                    }
                    Err(_) => prop_assert!(n > p.queued_len()),
                }
            }
            got.extend_from_slice(&p.take_all());
            prop_assert_eq!(got, expected);
            prop_assert!(p.is_empty());
        }

        #[test]
        fn drain_cuts_are_full_except_last(len in 1u64..(40 * MIB)) {
            let mut remaining = len;
            while remaining > 0 {
                let cut = next_cut(remaining).unwrap();
                prop_assert!(cut > 0 && cut <= remaining);
                if cut < remaining {
                    prop_assert!(BlockSize::from_bytes(cut).is_ok());
                }
                remaining -= cut;
            }
        }
    }
}
