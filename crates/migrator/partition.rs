//! Live/archive split planning.
//!
//! Blocks older than the finality delay can move to a read-optimized archive
//! store. This module only plans the split and writes the manifest describing
//! it; moving data is the archive backend's job. The archive backend reports
//! progress back through the `durableBlocks` manifest field, and only then can
//! the live store be marked as trimmed.

use std::{
    fs, io,
    ops::Range,
    path::{Path, PathBuf},
};

use chainmig_storage::{
    ChainDataReader, KeyValueReader, StorageBackend,
    api::schema::{ANCIENT_CUTOFF_KEY, HEAD_BLOCK_KEY, encode_block_number},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::MigrationError;

pub const DEFAULT_FINALITY_DELAY: u64 = 90_000;
pub const DEFAULT_ARCHIVE_TYPE: &str = "badgerdb";
pub const MANIFEST_VERSION: &str = "1.0";

const ANCIENT_DIR: &str = "ancient";
const MANIFEST_FILE: &str = "metadata.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionPlan {
    pub head_block: u64,
    pub finality_delay: u64,
    /// First block that stays in the live store.
    pub cutoff: u64,
}

impl PartitionPlan {
    /// Blocks destined for the archive.
    pub fn ancient_range(&self) -> Range<u64> {
        0..self.cutoff
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionOutcome {
    Planned(PartitionPlan),
    NotEnoughBlocks { head_block: u64, finality_delay: u64 },
}

/// Computes `cutoff = head - finality_delay` when the chain is long enough.
pub fn plan_partition(head_block: u64, finality_delay: u64) -> PartitionOutcome {
    if head_block <= finality_delay {
        return PartitionOutcome::NotEnoughBlocks {
            head_block,
            finality_delay,
        };
    }
    PartitionOutcome::Planned(PartitionPlan {
        head_block,
        finality_delay,
        cutoff: head_block - finality_delay,
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveManifest {
    #[serde(rename = "type")]
    pub archive_type: String,
    pub version: String,
    pub finality_delay: u64,
    pub ancient_blocks: u64,
    pub head_block: u64,
    /// Blocks `0..durable_blocks` are durably stored in the archive. Only the
    /// archive backend sets this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub durable_blocks: Option<u64>,
}

impl ArchiveManifest {
    pub fn new(plan: &PartitionPlan, archive_type: impl Into<String>) -> Self {
        Self {
            archive_type: archive_type.into(),
            version: MANIFEST_VERSION.to_string(),
            finality_delay: plan.finality_delay,
            ancient_blocks: plan.cutoff,
            head_block: plan.head_block,
            durable_blocks: None,
        }
    }
}

/// `<destination parent>/ancient/metadata.json`
pub fn manifest_path(destination: &Path) -> PathBuf {
    destination
        .parent()
        .unwrap_or(destination)
        .join(ANCIENT_DIR)
        .join(MANIFEST_FILE)
}

/// Creates the archive directory next to `destination` and writes the manifest.
pub fn write_manifest(
    destination: &Path,
    manifest: &ArchiveManifest,
) -> Result<PathBuf, MigrationError> {
    let path = manifest_path(destination);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&path, serde_json::to_vec_pretty(manifest)?)?;
    info!(
        "[MIGRATION] Archive manifest written to {} ({} ancient blocks)",
        path.display(),
        manifest.ancient_blocks
    );
    Ok(path)
}

pub fn read_manifest(destination: &Path) -> Result<ArchiveManifest, MigrationError> {
    let raw = fs::read(manifest_path(destination))?;
    Ok(serde_json::from_slice(&raw)?)
}

/// Like [`read_manifest`], but a missing manifest is `None`.
pub fn existing_manifest(destination: &Path) -> Result<Option<ArchiveManifest>, MigrationError> {
    match read_manifest(destination) {
        Ok(manifest) => Ok(Some(manifest)),
        Err(MigrationError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// The archival store receiving blocks below the cutoff.
pub trait ArchiveBackend {
    /// Whether every block in `range` is durably stored in the archive.
    fn confirm_durable(&self, range: Range<u64>) -> Result<bool, MigrationError>;
}

/// Archive confirmations read from the manifest next to a destination.
#[derive(Debug, Clone)]
pub struct ManifestArchive {
    destination: PathBuf,
}

impl ManifestArchive {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }
}

impl ArchiveBackend for ManifestArchive {
    fn confirm_durable(&self, range: Range<u64>) -> Result<bool, MigrationError> {
        let durable = existing_manifest(&self.destination)?.and_then(|m| m.durable_blocks);
        Ok(durable.is_some_and(|blocks| blocks >= range.end))
    }
}

/// Records the cutoff on the live store once the archive confirms the moved
/// range. Returns `false` and leaves the live store untouched otherwise.
pub fn mark_trimmed(
    live: &dyn StorageBackend,
    archive: &dyn ArchiveBackend,
    plan: &PartitionPlan,
) -> Result<bool, MigrationError> {
    if !archive.confirm_durable(plan.ancient_range())? {
        warn!(
            "[MIGRATION] Archive has not confirmed blocks {:?}; live store left untrimmed",
            plan.ancient_range()
        );
        return Ok(false);
    }
    live.put(ANCIENT_CUTOFF_KEY, &encode_block_number(plan.cutoff))?;
    live.flush()?;
    info!("[MIGRATION] Live store trimmed below #{}", plan.cutoff);
    Ok(true)
}

/// Reads the head number of a migrated store.
///
/// Prefers the `height` pointer and falls back to resolving `LastBlock`.
pub fn read_head_number<R: KeyValueReader + ?Sized>(
    store: &R,
) -> Result<Option<u64>, MigrationError> {
    let reader = ChainDataReader::new(store);
    if let Some(height) = reader.read_height()? {
        return Ok(Some(height));
    }
    match reader.read_head_hash(HEAD_BLOCK_KEY)? {
        Some(hash) => Ok(reader.read_block_number(hash)?),
        None => Ok(None),
    }
}

/// Plans the split for a migrated store and writes the manifest if the chain
/// is long enough. A `durableBlocks` confirmation already in the manifest is
/// kept.
pub fn partition_destination<R: KeyValueReader + ?Sized>(
    destination_path: &Path,
    store: &R,
    finality_delay: u64,
    archive_type: &str,
) -> Result<PartitionOutcome, MigrationError> {
    let head_block = read_head_number(store)?.ok_or_else(|| {
        MigrationError::InvalidConfig(format!(
            "{} has no head pointers; run the migration first",
            destination_path.display()
        ))
    })?;

    let outcome = plan_partition(head_block, finality_delay);
    match &outcome {
        PartitionOutcome::Planned(plan) => {
            let mut manifest = ArchiveManifest::new(plan, archive_type);
            manifest.durable_blocks =
                existing_manifest(destination_path)?.and_then(|previous| previous.durable_blocks);
            write_manifest(destination_path, &manifest)?;
        }
        PartitionOutcome::NotEnoughBlocks {
            head_block,
            finality_delay,
        } => {
            info!(
                "[MIGRATION] Not enough blocks to partition (head #{head_block}, finality delay {finality_delay})"
            );
        }
    }
    Ok(outcome)
}
