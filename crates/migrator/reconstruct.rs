//! Canonical chain reconstruction.
//!
//! Sources disagree on how (or whether) they record canonical pointers. The
//! reconstructor collects explicit canonical entries and header-derived hashes
//! in two separate maps during the scan and merges them once it is complete.

use std::collections::{BTreeMap, btree_map};

use ethereum_types::H256;
use tracing::{debug, info, warn};

use crate::{classify::ClassifiedRecord, error::MigrationError};

/// How the final chain was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconstructionMode {
    /// Every block came from an explicit canonical entry.
    Explicit,
    /// Explicit entries were completed with hashes taken from header keys.
    Merged,
    /// The source had no canonical entries at all; the chain is derived
    /// purely from per-block headers.
    HeaderFallback,
}

#[derive(Debug, Default)]
pub struct CanonicalReconstructor {
    canonical_blocks: BTreeMap<u64, H256>,
    block_hashes: BTreeMap<u64, H256>,
    canonical_conflicts: u64,
    header_conflicts: u64,
}

impl CanonicalReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one scanned record. Records other than canonical pointers and
    /// headers are ignored.
    ///
    /// When several entries claim the same number, the last one scanned wins.
    pub fn observe(&mut self, record: &ClassifiedRecord<'_>) {
        match *record {
            ClassifiedRecord::Canonical { number, hash } => {
                if let Some(previous) = self.canonical_blocks.insert(number, hash)
                    && previous != hash
                {
                    self.canonical_conflicts += 1;
                    debug!(
                        "[MIGRATION] Canonical entry for #{number} replaced: {previous:#x} -> {hash:#x}"
                    );
                }
            }
            ClassifiedRecord::Header { number, hash, .. } => {
                if let Some(previous) = self.block_hashes.insert(number, hash)
                    && previous != hash
                {
                    self.header_conflicts += 1;
                }
            }
            _ => {}
        }
    }

    /// Merges both maps into the final chain.
    ///
    /// Fails with [`MigrationError::EmptyCanonicalChain`] when neither map has
    /// any entry.
    pub fn finalize(self) -> Result<CanonicalChain, MigrationError> {
        let Self {
            mut canonical_blocks,
            block_hashes,
            canonical_conflicts,
            header_conflicts,
        } = self;

        if canonical_conflicts > 0 {
            warn!("[MIGRATION] {canonical_conflicts} canonical numbers had conflicting hashes");
        }
        if header_conflicts > 0 {
            debug!("[MIGRATION] {header_conflicts} header numbers had more than one hash");
        }

        let (blocks, mode, merged) = if canonical_blocks.is_empty() {
            let merged = block_hashes.len() as u64;
            (block_hashes, ReconstructionMode::HeaderFallback, merged)
        } else {
            let mut merged = 0;
            for (number, hash) in block_hashes {
                if let btree_map::Entry::Vacant(entry) = canonical_blocks.entry(number) {
                    entry.insert(hash);
                    merged += 1;
                }
            }
            let mode = if merged == 0 {
                ReconstructionMode::Explicit
            } else {
                ReconstructionMode::Merged
            };
            (canonical_blocks, mode, merged)
        };

        let Some((&max_block_number, &tip_hash)) = blocks.last_key_value() else {
            return Err(MigrationError::EmptyCanonicalChain);
        };

        let chain = CanonicalChain {
            blocks,
            max_block_number,
            tip_hash,
            mode,
            merged_from_headers: merged,
        };
        info!(
            "[MIGRATION] Canonical chain reconstructed: {} blocks, max #{max_block_number}, tip {tip_hash:#x}, mode {mode:?}, {} gaps",
            chain.len(),
            chain.gaps()
        );
        Ok(chain)
    }
}

/// Finalized `number -> hash` mapping. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalChain {
    blocks: BTreeMap<u64, H256>,
    max_block_number: u64,
    tip_hash: H256,
    mode: ReconstructionMode,
    merged_from_headers: u64,
}

impl CanonicalChain {
    pub fn get(&self, number: u64) -> Option<H256> {
        self.blocks.get(&number).copied()
    }

    /// Entries in ascending block number order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, H256)> + '_ {
        self.blocks.iter().map(|(number, hash)| (*number, *hash))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn max_block_number(&self) -> u64 {
        self.max_block_number
    }

    pub fn tip_hash(&self) -> H256 {
        self.tip_hash
    }

    pub fn mode(&self) -> ReconstructionMode {
        self.mode
    }

    /// Entries that came from header keys rather than canonical pointers.
    pub fn merged_from_headers(&self) -> u64 {
        self.merged_from_headers
    }

    /// Numbers in `[0, max_block_number]` without a hash.
    pub fn gaps(&self) -> u64 {
        self.max_block_number
            .saturating_add(1)
            .saturating_sub(self.blocks.len() as u64)
    }

    pub fn blocks(&self) -> &BTreeMap<u64, H256> {
        &self.blocks
    }
}
