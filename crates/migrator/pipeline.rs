//! Migration orchestration.
//!
//! One worker runs the whole pipeline sequentially:
//!
//! 1. `Scanning`: stream the source once, strip the namespace, classify every
//!    entry, copy pass-through records into batches and feed the
//!    reconstructor.
//! 2. `Accumulating`: finalize the canonical chain and pick the tip.
//! 3. `WritingBatches`: write canonical and reverse canonical pairs.
//! 4. `AwaitingTdCompletion`: write the total difficulty ledger and flush.
//! 5. `CommittingHead`: write every head pointer in one atomic batch.
//!
//! Cancellation is checked before every record. Once observed, only the batch
//! already staged is flushed and the head is never written.

use std::{sync::Arc, time::Duration};

use chainmig_rlp::encode::RLPEncode;
use chainmig_storage::{
    ChainDataReader, SourceStore, StorageBackend,
    api::schema::{canonical_hash_key, encode_block_number, header_number_key, td_key},
};
use ethereum_types::H256;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    classify::classify,
    config::MigrationConfig,
    difficulty::TotalDifficultyAccumulator,
    error::MigrationError,
    monitor::spawn_monitor,
    namespace::{DEFAULT_DETECTION_SCAN_LIMIT, Namespace, detect_namespace, strip_namespace},
    reconstruct::{CanonicalChain, CanonicalReconstructor, ReconstructionMode},
    stats::{MigrationPhase, MigrationStats},
    writer::{BatchWriter, commit_head},
};

/// Result of a completed migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationOutcome {
    pub namespace: Option<Namespace>,
    pub max_block_number: u64,
    pub tip_number: u64,
    pub tip_hash: H256,
    pub mode: ReconstructionMode,
    pub canonical_blocks: u64,
    pub gaps: u64,
}

/// Runs the migration on the calling thread.
///
/// The destination must be empty and must not be written by anyone else for
/// the duration of the call. On any error the destination is left without
/// head pointers and has to be discarded.
pub fn migrate(
    source: &dyn SourceStore,
    destination: &dyn StorageBackend,
    config: &MigrationConfig,
    stats: &MigrationStats,
    cancel: &CancellationToken,
) -> Result<MigrationOutcome, MigrationError> {
    let result = config
        .validate()
        .and_then(|()| Migration::new(source, destination, config, stats, cancel).run());

    match &result {
        Ok(outcome) => {
            stats.set_phase(MigrationPhase::Done);
            info!(
                "[MIGRATION] Completed: tip #{} ({:#x}), {} records written",
                outcome.tip_number,
                outcome.tip_hash,
                stats.written()
            );
        }
        Err(e) if e.is_interrupted() => {
            stats.set_phase(MigrationPhase::Interrupted);
            warn!("[MIGRATION] Interrupted during {}", stats.snapshot().phase_reached);
        }
        Err(e) => {
            stats.set_phase(MigrationPhase::Failed);
            warn!(
                "[MIGRATION] Failed during {}: {e}",
                stats.snapshot().phase_reached
            );
        }
    }
    result
}

struct Migration<'a> {
    source: &'a dyn SourceStore,
    destination: &'a dyn StorageBackend,
    config: &'a MigrationConfig,
    stats: &'a MigrationStats,
    cancel: &'a CancellationToken,
}

impl<'a> Migration<'a> {
    fn new(
        source: &'a dyn SourceStore,
        destination: &'a dyn StorageBackend,
        config: &'a MigrationConfig,
        stats: &'a MigrationStats,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            source,
            destination,
            config,
            stats,
            cancel,
        }
    }

    fn run(&self) -> Result<MigrationOutcome, MigrationError> {
        self.stats.set_phase(MigrationPhase::Scanning);
        let namespace = self.resolve_namespace()?;
        let mut writer = BatchWriter::new(self.destination, self.config.batch_size, self.stats)?;

        let reconstructor = self.scan(namespace.as_ref(), &mut writer)?;

        self.stats.set_phase(MigrationPhase::Accumulating);
        let chain = reconstructor.finalize()?;
        self.stats.set_max_block_number(chain.max_block_number());
        let (tip_number, tip_hash) = self.select_tip(&chain)?;
        self.stats.set_tip(tip_number, tip_hash);

        self.stats.set_phase(MigrationPhase::WritingBatches);
        self.write_canonical_pairs(&chain, &mut writer)?;

        self.stats.set_phase(MigrationPhase::AwaitingTdCompletion);
        self.write_total_difficulty(&chain, &mut writer)?;
        writer.flush()?;
        self.destination.flush()?;

        if !ChainDataReader::new(self.destination).has_header(tip_number, tip_hash)? {
            return Err(MigrationError::MissingTipHeader {
                number: tip_number,
                hash: tip_hash,
            });
        }
        self.check_cancelled(&mut writer)?;

        self.stats.set_phase(MigrationPhase::CommittingHead);
        commit_head(self.destination, tip_number, tip_hash)?;

        Ok(MigrationOutcome {
            namespace,
            max_block_number: chain.max_block_number(),
            tip_number,
            tip_hash,
            mode: chain.mode(),
            canonical_blocks: chain.len() as u64,
            gaps: chain.gaps(),
        })
    }

    fn resolve_namespace(&self) -> Result<Option<Namespace>, MigrationError> {
        if let Some(namespace) = self.config.namespace {
            info!("[MIGRATION] Using namespace {namespace}");
            return Ok(Some(namespace));
        }
        if !self.config.detect_namespace {
            return Ok(None);
        }
        Ok(detect_namespace(self.source, DEFAULT_DETECTION_SCAN_LIMIT)?)
    }

    /// First pass over the source.
    fn scan(
        &self,
        namespace: Option<&Namespace>,
        writer: &mut BatchWriter<'_>,
    ) -> Result<CanonicalReconstructor, MigrationError> {
        info!("[MIGRATION] Scanning source");
        let mut reconstructor = CanonicalReconstructor::new();
        for entry in self.source.iter_all()? {
            self.check_cancelled(writer)?;
            let (key, value) = entry?;
            let key = strip_namespace(&key, namespace);
            let record = classify(key, &value);

            self.stats.record_scanned(record.kind());
            reconstructor.observe(&record);
            if record.is_passthrough() {
                writer.put(key, &value)?;
            }
        }
        let scanned = self.stats.snapshot();
        info!(
            "[MIGRATION] Scan complete: {} keys, {} headers, {} canonical, {} skipped",
            scanned.total, scanned.headers, scanned.canonical, scanned.skipped
        );
        Ok(reconstructor)
    }

    fn select_tip(&self, chain: &CanonicalChain) -> Result<(u64, H256), MigrationError> {
        match self.config.tip_height {
            Some(height) => {
                let hash = chain
                    .get(height)
                    .ok_or(MigrationError::MissingTipCanonicalHash(height))?;
                if height != chain.max_block_number() {
                    info!(
                        "[MIGRATION] Using configured tip #{height} instead of highest block #{}",
                        chain.max_block_number()
                    );
                }
                Ok((height, hash))
            }
            None => Ok((chain.max_block_number(), chain.tip_hash())),
        }
    }

    fn write_canonical_pairs(
        &self,
        chain: &CanonicalChain,
        writer: &mut BatchWriter<'_>,
    ) -> Result<(), MigrationError> {
        for (number, hash) in chain.iter() {
            self.check_cancelled(writer)?;
            writer.put(&canonical_hash_key(number), hash.as_bytes())?;
            writer.put(&header_number_key(hash), &encode_block_number(number))?;
            self.stats.record_canonical_pair();
        }
        if chain.gaps() > 0 {
            warn!(
                "[MIGRATION] Canonical chain has {} gaps below #{}",
                chain.gaps(),
                chain.max_block_number()
            );
        }
        Ok(())
    }

    fn write_total_difficulty(
        &self,
        chain: &CanonicalChain,
        writer: &mut BatchWriter<'_>,
    ) -> Result<(), MigrationError> {
        for record in TotalDifficultyAccumulator::new(chain) {
            self.check_cancelled(writer)?;
            writer.put(
                &td_key(record.number, record.hash),
                &record.total_difficulty.encode_to_vec(),
            )?;
            self.stats.record_total_difficulty();
        }
        Ok(())
    }

    /// On cancellation, flushes what is staged and reports the interruption.
    /// A failed flush is returned instead, since the staged writes are lost.
    fn check_cancelled(&self, writer: &mut BatchWriter<'_>) -> Result<(), MigrationError> {
        if !self.cancel.is_cancelled() {
            return Ok(());
        }
        info!("[MIGRATION] Received shutdown signal, aborting");
        writer.flush().inspect_err(|e| {
            warn!("[MIGRATION] Cannot flush staged batch after interrupt: {e}");
        })?;
        Err(MigrationError::Interrupted)
    }
}

/// Runs [`migrate`] on a blocking thread with a progress monitor alongside.
///
/// Cancelling `cancel` interrupts the run; the monitor stops with it.
pub async fn run_migration(
    source: Arc<dyn SourceStore>,
    destination: Arc<dyn StorageBackend>,
    config: MigrationConfig,
    stats: Arc<MigrationStats>,
    cancel: CancellationToken,
) -> Result<MigrationOutcome, MigrationError> {
    config.validate()?;
    let monitor_stop = cancel.child_token();
    let monitor = spawn_monitor(
        stats.clone(),
        Duration::from_secs(config.monitor_interval_secs),
        monitor_stop.clone(),
    );

    let result = tokio::task::spawn_blocking(move || {
        migrate(&*source, &*destination, &config, &stats, &cancel)
    })
    .await
    .map_err(|e| MigrationError::Worker(e.to_string()));

    monitor_stop.cancel();
    if let Err(e) = monitor.await {
        warn!("[MIGRATION] Monitor task failed: {e}");
    }
    result?
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainmig_storage::{
        InMemoryBackend, KeyValueReader,
        api::schema::{HEAD_BLOCK_KEY, header_key},
    };

    fn hash(number: u64) -> H256 {
        H256::from_low_u64_be(0x1000 + number)
    }

    fn source_with_blocks(count: u64) -> InMemoryBackend {
        let mut entries = Vec::new();
        for number in 0..count {
            entries.push((canonical_hash_key(number), hash(number).as_bytes().to_vec()));
            entries.push((header_key(number, hash(number)), vec![0xc1, 0x80]));
        }
        InMemoryBackend::from_entries(entries)
    }

    #[test]
    fn migrates_sequential_chain() {
        let source = source_with_blocks(4);
        let destination = InMemoryBackend::new();
        let stats = MigrationStats::new();
        let config = MigrationConfig {
            batch_size: 3,
            ..Default::default()
        };

        let outcome = migrate(
            &source,
            &destination,
            &config,
            &stats,
            &CancellationToken::new(),
        )
        .expect("migration");

        assert_eq!(outcome.tip_number, 3);
        assert_eq!(outcome.tip_hash, hash(3));
        assert_eq!(outcome.mode, ReconstructionMode::Explicit);
        assert_eq!(stats.phase(), MigrationPhase::Done);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.canonical, 4);
        assert_eq!(snapshot.headers, 4);
        assert_eq!(snapshot.total_difficulty, 4);
        assert_eq!(snapshot.tip_hash, Some(hash(3)));
    }

    #[test]
    fn configured_tip_must_be_canonical() {
        let source = source_with_blocks(3);
        let destination = InMemoryBackend::new();
        let stats = MigrationStats::new();
        let config = MigrationConfig {
            tip_height: Some(10),
            ..Default::default()
        };

        let result = migrate(
            &source,
            &destination,
            &config,
            &stats,
            &CancellationToken::new(),
        );
        assert!(matches!(
            result,
            Err(MigrationError::MissingTipCanonicalHash(10))
        ));
        assert_eq!(stats.phase(), MigrationPhase::Failed);
        assert_eq!(destination.get(HEAD_BLOCK_KEY).expect("get"), None);
    }

    #[test]
    fn configured_tip_below_max() {
        let source = source_with_blocks(5);
        let destination = InMemoryBackend::new();
        let config = MigrationConfig {
            tip_height: Some(2),
            ..Default::default()
        };

        let outcome = migrate(
            &source,
            &destination,
            &config,
            &MigrationStats::new(),
            &CancellationToken::new(),
        )
        .expect("migration");
        assert_eq!(outcome.tip_number, 2);
        assert_eq!(outcome.max_block_number, 4);

        let reader = ChainDataReader::new(&destination);
        assert_eq!(reader.read_height().expect("height"), Some(2));
        assert_eq!(reader.read_canonical_hash(4).expect("read"), Some(hash(4)));
    }

    #[test]
    fn tip_without_header_is_rejected() {
        let source = InMemoryBackend::from_entries([(
            canonical_hash_key(0),
            hash(0).as_bytes().to_vec(),
        )]);
        let destination = InMemoryBackend::new();
        let stats = MigrationStats::new();

        let result = migrate(
            &source,
            &destination,
            &MigrationConfig::default(),
            &stats,
            &CancellationToken::new(),
        );
        assert!(matches!(
            result,
            Err(MigrationError::MissingTipHeader { number: 0, .. })
        ));
        assert_eq!(destination.get(HEAD_BLOCK_KEY).expect("get"), None);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.phase_reached, MigrationPhase::AwaitingTdCompletion);
        assert_eq!(snapshot.tip_number, Some(0));
        assert_eq!(snapshot.tip_hash, Some(hash(0)));
    }

    #[test]
    fn invalid_config_fails_before_touching_destination() {
        let source = source_with_blocks(1);
        let destination = InMemoryBackend::new();
        let config = MigrationConfig {
            batch_size: 0,
            ..Default::default()
        };
        let result = migrate(
            &source,
            &destination,
            &config,
            &MigrationStats::new(),
            &CancellationToken::new(),
        );
        assert!(matches!(result, Err(MigrationError::InvalidConfig(_))));
        assert!(destination.is_empty().expect("is_empty"));
    }

    #[test]
    fn cancelled_before_start_writes_nothing() {
        let source = source_with_blocks(3);
        let destination = InMemoryBackend::new();
        let stats = MigrationStats::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = migrate(
            &source,
            &destination,
            &MigrationConfig::default(),
            &stats,
            &cancel,
        );
        assert!(result.as_ref().is_err_and(MigrationError::is_interrupted));
        assert_eq!(stats.phase(), MigrationPhase::Interrupted);
        assert!(destination.is_empty().expect("is_empty"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn run_migration_completes_with_monitor() {
        let source: Arc<dyn SourceStore> = Arc::new(source_with_blocks(3));
        let destination = InMemoryBackend::new();
        let stats = Arc::new(MigrationStats::new());

        let outcome = run_migration(
            source,
            Arc::new(destination.clone()),
            MigrationConfig::default(),
            stats.clone(),
            CancellationToken::new(),
        )
        .await
        .expect("migration");

        assert_eq!(outcome.tip_number, 2);
        assert_eq!(stats.phase(), MigrationPhase::Done);
        assert_eq!(
            ChainDataReader::new(&destination)
                .read_head_hash(HEAD_BLOCK_KEY)
                .expect("read"),
            Some(hash(2))
        );
    }
}
