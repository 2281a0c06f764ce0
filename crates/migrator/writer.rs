//! Destination writes.
//!
//! Everything except the head pointers goes through a [`BatchWriter`], which
//! commits every `batch_size` staged writes. The head pointers are written by
//! [`commit_head`] in a separate, final batch.

use chainmig_storage::{
    StorageBackend, StorageWriteBatch,
    api::schema::{
        HEAD_HASH_KEYS, HEIGHT_KEY, INITIALIZED_KEY, LAST_ACCEPTED_HEIGHT_KEY,
        encode_block_number,
    },
};
use ethereum_types::H256;
use tracing::{debug, info};

use crate::{error::MigrationError, stats::MigrationStats};

pub struct BatchWriter<'a> {
    batch: Box<dyn StorageWriteBatch + 'a>,
    batch_size: usize,
    stats: &'a MigrationStats,
}

impl<'a> BatchWriter<'a> {
    pub fn new(
        destination: &'a dyn StorageBackend,
        batch_size: usize,
        stats: &'a MigrationStats,
    ) -> Result<Self, MigrationError> {
        Ok(Self {
            batch: destination.begin_write()?,
            batch_size: batch_size.max(1),
            stats,
        })
    }

    /// Stages a write, committing the batch once it reaches the threshold.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<(), MigrationError> {
        self.batch.put(key, value)?;
        if self.batch.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Commits whatever is staged. A no-op on an empty batch.
    pub fn flush(&mut self) -> Result<(), MigrationError> {
        let pending = self.batch.len();
        if pending == 0 {
            return Ok(());
        }
        self.batch.commit()?;
        self.stats.record_committed(pending);
        debug!("[MIGRATION] Committed batch of {pending} writes");
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }
}

/// Points every head key at `(number, hash)` in one atomic batch, then forces
/// the destination to durable storage.
///
/// Must only run after every batch carrying data for the tip has committed.
pub fn commit_head(
    destination: &dyn StorageBackend,
    number: u64,
    hash: H256,
) -> Result<(), MigrationError> {
    let encoded_number = encode_block_number(number);
    let mut batch = destination.begin_write()?;
    for key in HEAD_HASH_KEYS {
        batch.put(key, hash.as_bytes())?;
    }
    batch.put(HEIGHT_KEY, &encoded_number)?;
    batch.put(LAST_ACCEPTED_HEIGHT_KEY, &encoded_number)?;
    batch.put(INITIALIZED_KEY, &[1])?;
    batch.commit()?;
    destination.flush()?;
    info!("[MIGRATION] Head pointers set to #{number} ({hash:#x})");
    Ok(())
}
