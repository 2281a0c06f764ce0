//! Total difficulty ledger.
//!
//! Source chains run with a fixed per-block difficulty of 1, so the
//! cumulative difficulty of block `n` is `n + 1`. The accumulator still
//! advances across gaps in the canonical chain, keeping the series strictly
//! increasing for every number that does have a hash.

use ethereum_types::{H256, U256};

use crate::reconstruct::CanonicalChain;

/// Per-block difficulty of the supported source chains.
pub const BLOCK_DIFFICULTY: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalDifficultyRecord {
    pub number: u64,
    pub hash: H256,
    pub total_difficulty: U256,
}

/// Yields one record per canonical block, in ascending number order.
pub struct TotalDifficultyAccumulator<'a> {
    blocks: Box<dyn Iterator<Item = (u64, H256)> + 'a>,
    /// First number not yet accounted for in `td`.
    next_number: u64,
    td: U256,
}

impl<'a> TotalDifficultyAccumulator<'a> {
    pub fn new(chain: &'a CanonicalChain) -> Self {
        Self {
            blocks: Box::new(chain.iter()),
            next_number: 0,
            td: U256::zero(),
        }
    }
}

impl Iterator for TotalDifficultyAccumulator<'_> {
    type Item = TotalDifficultyRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let (number, hash) = self.blocks.next()?;
        // Numbers skipped since the last emission still add their difficulty.
        let advanced = U256::from(number - self.next_number) + U256::one();
        self.td += advanced * U256::from(BLOCK_DIFFICULTY);
        self.next_number = number.saturating_add(1);
        Some(TotalDifficultyRecord {
            number,
            hash,
            total_difficulty: self.td,
        })
    }
}
