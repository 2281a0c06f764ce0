use std::{
    fmt,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use chainmig_migrator::{
    MigrationConfig, MigrationStats, Namespace, VerificationReport,
    config::{DEFAULT_BATCH_SIZE, DEFAULT_MONITOR_INTERVAL_SECS},
    monitor::spawn_interrupt_listener,
    partition::{
        DEFAULT_ARCHIVE_TYPE, DEFAULT_FINALITY_DELAY, ManifestArchive, PartitionOutcome,
        manifest_path, mark_trimmed, partition_destination,
    },
    report::{MigrationReport, MigrationStatus, REPORT_SCHEMA_VERSION},
    run_migration, verify_destination,
};
use chainmig_storage::{
    EngineType, SourceStore, StorageBackend, open_destination_store, open_source_store,
};
use clap::{Args as ClapArgs, Parser as ClapParser, Subcommand as ClapSubcommand};
use eyre::{Result, WrapErr};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};

#[allow(clippy::upper_case_acronyms)]
#[derive(ClapParser)]
#[command(
    name = "chainmig",
    about = "Migrate namespaced chain data into a go-ethereum style rawdb store"
)]
pub struct CLI {
    #[arg(
        long = "log.level",
        global = true,
        default_value_t = Level::INFO,
        value_name = "LOG_LEVEL",
        env = "CHAINMIG_LOG_LEVEL",
        help = "The verbosity level used for logs."
    )]
    pub log_level: Level,
    #[command(subcommand)]
    pub command: Subcommand,
}

#[derive(ClapSubcommand)]
pub enum Subcommand {
    #[command(about = "Copy a source store into a destination and rebuild its canonical chain")]
    Migrate(MigrateOptions),
    #[command(about = "Check head pointers, canonical mappings and total difficulty of a store")]
    Verify {
        #[arg(long = "destination", env = "CHAINMIG_DESTINATION")]
        destination: PathBuf,
        #[arg(long = "json", default_value_t = false)]
        json: bool,
        #[arg(long = "report-file")]
        report_file: Option<PathBuf>,
    },
    #[command(about = "Write the archive manifest for an already migrated store")]
    Partition {
        #[arg(long = "destination", env = "CHAINMIG_DESTINATION")]
        destination: PathBuf,
        #[arg(long = "finality-delay", default_value_t = DEFAULT_FINALITY_DELAY)]
        finality_delay: u64,
        #[arg(long = "archive-type", default_value = DEFAULT_ARCHIVE_TYPE)]
        archive_type: String,
        #[arg(
            long = "mark-trimmed",
            default_value_t = false,
            help = "Record the cutoff on the store once the archive manifest confirms the moved blocks as durable"
        )]
        mark_trimmed: bool,
        #[arg(long = "json", default_value_t = false)]
        json: bool,
        #[arg(long = "report-file")]
        report_file: Option<PathBuf>,
    },
}

#[derive(ClapArgs)]
pub struct MigrateOptions {
    #[arg(long = "source", env = "CHAINMIG_SOURCE")]
    /// Path to the source RocksDB store, opened read-only
    pub source: PathBuf,
    #[arg(long = "destination", env = "CHAINMIG_DESTINATION")]
    /// Path to the destination RocksDB store, created if missing
    pub destination: PathBuf,
    #[arg(long = "namespace", env = "CHAINMIG_NAMESPACE", value_name = "HEX")]
    /// 32-byte key prefix to strip, hex encoded
    pub namespace: Option<Namespace>,
    #[arg(long = "detect-namespace", default_value_t = false)]
    /// Scan the source for a namespace when --namespace is not given
    pub detect_namespace: bool,
    #[arg(long = "batch-size", default_value_t = DEFAULT_BATCH_SIZE, env = "CHAINMIG_BATCH_SIZE")]
    /// Writes per destination batch
    pub batch_size: usize,
    #[arg(long = "tip-height")]
    /// Commit this height as head instead of the highest migrated block
    pub tip_height: Option<u64>,
    #[arg(long = "monitor-interval", default_value_t = DEFAULT_MONITOR_INTERVAL_SECS)]
    /// Seconds between progress lines
    pub monitor_interval: u64,
    #[arg(long = "partition", default_value_t = false)]
    /// Plan the live/archive split once the migration completes
    pub partition: bool,
    #[arg(long = "finality-delay", default_value_t = DEFAULT_FINALITY_DELAY)]
    /// Blocks kept in the live store when partitioning
    pub finality_delay: u64,
    #[arg(long = "archive-type", default_value = DEFAULT_ARCHIVE_TYPE)]
    /// Archive backend recorded in the manifest
    pub archive_type: String,
    #[arg(long = "json", default_value_t = false)]
    /// Emit machine-readable JSON output
    pub json: bool,
    #[arg(long = "report-file")]
    /// Optional path to append emitted reports (JSON lines in --json mode)
    pub report_file: Option<PathBuf>,
}

impl MigrateOptions {
    pub fn config(&self) -> MigrationConfig {
        MigrationConfig {
            source_path: self.source.clone(),
            destination_path: self.destination.clone(),
            namespace: self.namespace,
            detect_namespace: self.detect_namespace,
            batch_size: self.batch_size,
            finality_delay: self.finality_delay,
            archive_type: self.archive_type.clone(),
            monitor_interval_secs: self.monitor_interval,
            tip_height: self.tip_height,
        }
    }
}

/// The command already emitted a report describing this failure.
#[derive(Debug)]
pub struct ReportedFailure(pub String);

impl fmt::Display for ReportedFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ReportedFailure {}

#[derive(Serialize)]
struct ErrorReport {
    schema_version: u32,
    status: &'static str,
    command: &'static str,
    error: String,
    elapsed_ms: u64,
}

#[derive(Serialize)]
struct VerifyReport {
    schema_version: u32,
    status: &'static str,
    #[serde(flatten)]
    verification: VerificationReport,
}

#[derive(Serialize)]
struct PartitionReport {
    schema_version: u32,
    status: &'static str,
    head_block: u64,
    finality_delay: u64,
    cutoff: Option<u64>,
    manifest: Option<PathBuf>,
    trimmed: bool,
}

impl PartitionReport {
    fn new(outcome: PartitionOutcome, destination: &Path) -> Self {
        match outcome {
            PartitionOutcome::Planned(plan) => Self {
                schema_version: REPORT_SCHEMA_VERSION,
                status: "planned",
                head_block: plan.head_block,
                finality_delay: plan.finality_delay,
                cutoff: Some(plan.cutoff),
                manifest: Some(manifest_path(destination)),
                trimmed: false,
            },
            PartitionOutcome::NotEnoughBlocks {
                head_block,
                finality_delay,
            } => Self {
                schema_version: REPORT_SCHEMA_VERSION,
                status: "skipped",
                head_block,
                finality_delay,
                cutoff: None,
                manifest: None,
                trimmed: false,
            },
        }
    }

    fn summary(&self) -> String {
        match (self.cutoff, &self.manifest) {
            (Some(cutoff), Some(_)) if self.trimmed => {
                format!("Partition trimmed: live store starts at #{cutoff}")
            }
            (Some(cutoff), Some(manifest)) => format!(
                "Partition planned: blocks below #{cutoff} go to the archive (manifest: {})",
                manifest.display()
            ),
            _ => format!(
                "Partition skipped: head #{} is within the finality delay of {}",
                self.head_block, self.finality_delay
            ),
        }
    }
}

fn elapsed_ms(started_at: Instant) -> u64 {
    started_at.elapsed().as_millis() as u64
}

fn build_error_report(
    command: &'static str,
    error: &eyre::Report,
    started_at: Instant,
) -> ErrorReport {
    ErrorReport {
        schema_version: REPORT_SCHEMA_VERSION,
        status: "failed",
        command,
        error: format!("{error:#}"),
        elapsed_ms: elapsed_ms(started_at),
    }
}

/// Reports a failure that happened before the command could emit its own report.
pub fn emit_error_report(
    command: &'static str,
    json: bool,
    started_at: Instant,
    error: &eyre::Report,
    report_file: Option<&Path>,
) {
    if json {
        let report = build_error_report(command, error, started_at);
        match serde_json::to_string(&report) {
            Ok(encoded) => {
                println!("{encoded}");
                if let Err(write_error) = append_report_line(report_file, &encoded) {
                    eprintln!(
                        "{command} failed: {error:#}\nCannot write report file: {write_error:#}"
                    );
                }
            }
            Err(ser_error) => {
                eprintln!("{command} failed: {error:#}\nReport encoding failed: {ser_error}")
            }
        }
        return;
    }

    let line = format!("{command} failed after {}ms: {error:#}", elapsed_ms(started_at));
    eprintln!("{line}");
    if let Err(write_error) = append_report_line(report_file, &line) {
        eprintln!("Cannot write report file: {write_error:#}");
    }
}

fn append_report_line(report_file: Option<&Path>, line: &str) -> Result<()> {
    let Some(path) = report_file else {
        return Ok(());
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .wrap_err_with(|| format!("Cannot create report directory {parent:?}"))?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .wrap_err_with(|| format!("Cannot open report file {path:?}"))?;
    writeln!(file, "{line}").wrap_err_with(|| format!("Cannot write report file {path:?}"))?;
    Ok(())
}

/// Prints `report` as one JSON line, or as `lines()` in human mode.
fn emit<T: Serialize>(
    report: &T,
    lines: impl FnOnce() -> Vec<String>,
    json: bool,
    report_file: Option<&Path>,
) -> Result<()> {
    if json {
        let encoded = serde_json::to_string(report).wrap_err("Cannot serialize report")?;
        println!("{encoded}");
        return append_report_line(report_file, &encoded);
    }
    for line in lines() {
        println!("{line}");
        append_report_line(report_file, &line)?;
    }
    Ok(())
}

impl Subcommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Migrate(_) => "migrate",
            Self::Verify { .. } => "verify",
            Self::Partition { .. } => "partition",
        }
    }

    pub fn json_output(&self) -> bool {
        match self {
            Self::Migrate(options) => options.json,
            Self::Verify { json, .. } | Self::Partition { json, .. } => *json,
        }
    }

    pub fn report_file(&self) -> Option<&Path> {
        match self {
            Self::Migrate(options) => options.report_file.as_deref(),
            Self::Verify { report_file, .. } | Self::Partition { report_file, .. } => {
                report_file.as_deref()
            }
        }
    }

    pub async fn run(&self, started_at: Instant) -> Result<()> {
        let json = self.json_output();
        let report_file = self.report_file();
        match self {
            Self::Migrate(options) => {
                migrate(options.config(), options.partition, json, report_file, started_at).await
            }
            Self::Verify { destination, .. } => verify(destination, json, report_file),
            Self::Partition {
                destination,
                finality_delay,
                archive_type,
                mark_trimmed,
                ..
            } => partition(
                destination,
                *finality_delay,
                archive_type,
                *mark_trimmed,
                json,
                report_file,
            ),
        }
    }
}

fn partition(
    destination: &Path,
    finality_delay: u64,
    archive_type: &str,
    trim: bool,
    json: bool,
    report_file: Option<&Path>,
) -> Result<()> {
    if !trim {
        let store = open_source_store(destination, EngineType::RocksDB)
            .wrap_err_with(|| format!("Cannot open store {destination:?}"))?;
        let outcome = partition_destination(destination, &*store, finality_delay, archive_type)?;
        let report = PartitionReport::new(outcome, destination);
        return emit(&report, || vec![report.summary()], json, report_file);
    }

    let store = open_destination_store(destination, EngineType::RocksDB)
        .wrap_err_with(|| format!("Cannot open store {destination:?}"))?;
    let outcome = partition_destination(destination, &*store, finality_delay, archive_type)?;
    let mut report = PartitionReport::new(outcome, destination);
    if let PartitionOutcome::Planned(plan) = outcome {
        report.trimmed = mark_trimmed(&*store, &ManifestArchive::new(destination), &plan)?;
    }
    emit(&report, || vec![report.summary()], json, report_file)
}

/// Validates `config` and opens both stores.
fn open_stores(
    config: &MigrationConfig,
) -> Result<(Arc<dyn SourceStore>, Arc<dyn StorageBackend>)> {
    config.validate()?;
    let source = open_source_store(&config.source_path, EngineType::RocksDB)
        .wrap_err_with(|| format!("Cannot open source store {:?}", config.source_path))?;
    let destination = open_destination_store(&config.destination_path, EngineType::RocksDB)
        .wrap_err_with(|| {
            format!(
                "Cannot open destination store {:?}",
                config.destination_path
            )
        })?;
    Ok((source, destination))
}

async fn migrate(
    config: MigrationConfig,
    partition: bool,
    json: bool,
    report_file: Option<&Path>,
    started_at: Instant,
) -> Result<()> {
    let (source, destination) = match open_stores(&config) {
        Ok(stores) => stores,
        Err(error) => {
            // Nothing was scanned yet; the counts are all zero.
            let mut report = MigrationReport::new(
                MigrationStatus::Failed,
                &MigrationStats::new().snapshot(),
                None,
                elapsed_ms(started_at),
            );
            report.error = Some(format!("{error:#}"));
            emit(&report, || report.summary_lines(), json, report_file)?;
            return Err(ReportedFailure(format!("{error:#}")).into());
        }
    };
    info!(
        "[MIGRATION] Migrating {} into {}",
        config.source_path.display(),
        config.destination_path.display()
    );

    let destination_path = config.destination_path.clone();
    let finality_delay = config.finality_delay;
    let archive_type = config.archive_type.clone();

    let stats = Arc::new(MigrationStats::new());
    let cancel = CancellationToken::new();
    let listener = spawn_interrupt_listener(cancel.clone());
    let result = run_migration(
        source,
        destination.clone(),
        config,
        stats.clone(),
        cancel,
    )
    .await;
    listener.abort();

    let report = MigrationReport::new(
        MigrationStatus::from_result(&result),
        &stats.snapshot(),
        result.as_ref().err(),
        elapsed_ms(started_at),
    );
    emit(&report, || report.summary_lines(), json, report_file)?;
    if let Err(error) = result {
        return Err(ReportedFailure(error.to_string()).into());
    }

    if partition {
        let outcome =
            partition_destination(&destination_path, &*destination, finality_delay, &archive_type)?;
        let report = PartitionReport::new(outcome, &destination_path);
        emit(&report, || vec![report.summary()], json, report_file)?;
    }
    Ok(())
}

fn verify(destination: &Path, json: bool, report_file: Option<&Path>) -> Result<()> {
    let store = open_source_store(destination, EngineType::RocksDB)
        .wrap_err_with(|| format!("Cannot open store {destination:?}"))?;
    let verification = verify_destination(&*store)?;
    let ok = verification.is_ok();
    let report = VerifyReport {
        schema_version: REPORT_SCHEMA_VERSION,
        status: if ok { "ok" } else { "inconsistent" },
        verification,
    };
    emit(
        &report,
        || {
            let v = &report.verification;
            let mut lines = vec![format!(
                "Verification {}: {} block(s) checked up to #{}",
                report.status,
                v.checked_blocks,
                v.head_number.map_or_else(|| "?".to_string(), |n| n.to_string())
            )];
            lines.extend(v.failures.iter().map(|failure| format!("  {failure}")));
            lines
        },
        json,
        report_file,
    )?;
    if !ok {
        return Err(ReportedFailure(format!("{} is inconsistent", destination.display())).into());
    }
    Ok(())
}
