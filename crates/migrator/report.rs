//! Machine-readable run summary.

use std::fmt;

use ethereum_types::H256;
use serde::Serialize;

use crate::{
    error::MigrationError,
    stats::{MigrationPhase, StatsSnapshot},
};

pub const REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    Completed,
    Failed,
    Interrupted,
}

impl MigrationStatus {
    pub fn from_result<T>(result: &Result<T, MigrationError>) -> Self {
        match result {
            Ok(_) => Self::Completed,
            Err(e) if e.is_interrupted() => Self::Interrupted,
            Err(_) => Self::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub schema_version: u32,
    pub status: MigrationStatus,
    /// Last phase the worker entered.
    pub phase: MigrationPhase,
    pub total: u64,
    pub written: u64,
    pub headers: u64,
    pub bodies: u64,
    pub receipts: u64,
    pub total_difficulty: u64,
    pub canonical: u64,
    pub canonical_written: u64,
    pub state_nodes: u64,
    pub code: u64,
    pub other: u64,
    pub skipped: u64,
    pub max_block_number: Option<u64>,
    pub tip_number: Option<u64>,
    pub tip_hash: Option<H256>,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl MigrationReport {
    pub fn new(
        status: MigrationStatus,
        stats: &StatsSnapshot,
        error: Option<&MigrationError>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            status,
            phase: stats.phase_reached,
            total: stats.total,
            written: stats.written,
            headers: stats.headers,
            bodies: stats.bodies,
            receipts: stats.receipts,
            total_difficulty: stats.total_difficulty,
            canonical: stats.canonical,
            canonical_written: stats.canonical_written,
            state_nodes: stats.state_nodes,
            code: stats.code,
            other: stats.other,
            skipped: stats.skipped,
            max_block_number: stats.max_block_number,
            tip_number: stats.tip_number,
            tip_hash: stats.tip_hash,
            error: error.map(ToString::to_string),
            elapsed_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == MigrationStatus::Completed
    }

    /// Human-readable summary, one entry per line.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!(
                "Migration {} after {}ms (phase: {})",
                self.status, self.elapsed_ms, self.phase
            ),
            format!(
                "  Total: {} | Written: {} | Skipped: {}",
                self.total, self.written, self.skipped
            ),
            format!(
                "  Headers: {} | Bodies: {} | Receipts: {}",
                self.headers, self.bodies, self.receipts
            ),
            format!(
                "  Canonical: {} (written {}) | TotalDifficulty: {}",
                self.canonical, self.canonical_written, self.total_difficulty
            ),
            format!(
                "  StateNodes: {} | Code: {} | Other: {}",
                self.state_nodes, self.code, self.other
            ),
        ];
        if let Some(max) = self.max_block_number {
            lines.push(format!("  MaxBlockNum: {max}"));
        }
        if let (Some(number), Some(hash)) = (self.tip_number, self.tip_hash) {
            lines.push(format!("  Head: #{number} ({hash:#x})"));
        }
        if let Some(error) = &self.error {
            lines.push(format!("  Error: {error}"));
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::MigrationStats;

    #[test]
    fn status_follows_result() {
        let ok: Result<(), MigrationError> = Ok(());
        assert_eq!(MigrationStatus::from_result(&ok), MigrationStatus::Completed);
        let interrupted: Result<(), MigrationError> = Err(MigrationError::Interrupted);
        assert_eq!(
            MigrationStatus::from_result(&interrupted),
            MigrationStatus::Interrupted
        );
        let failed: Result<(), MigrationError> = Err(MigrationError::EmptyCanonicalChain);
        assert_eq!(MigrationStatus::from_result(&failed), MigrationStatus::Failed);
    }

    #[test]
    fn json_contract_keys_are_stable() {
        let snapshot = MigrationStats::new().snapshot();
        let report = MigrationReport::new(
            MigrationStatus::Failed,
            &snapshot,
            Some(&MigrationError::EmptyCanonicalChain),
            12,
        );
        let value = serde_json::to_value(&report).expect("serialize");
        let object = value.as_object().expect("object");
        for key in [
            "schema_version",
            "status",
            "phase",
            "total",
            "written",
            "headers",
            "bodies",
            "receipts",
            "total_difficulty",
            "canonical",
            "state_nodes",
            "code",
            "other",
            "skipped",
            "max_block_number",
            "tip_hash",
            "error",
            "elapsed_ms",
        ] {
            assert!(object.contains_key(key), "missing {key}");
        }
        assert_eq!(value["status"], "failed");
        assert_eq!(value["phase"], "scanning");
        assert_eq!(value["schema_version"], REPORT_SCHEMA_VERSION);
        assert!(value["tip_hash"].is_null());
    }

    #[test]
    fn failed_summary_never_claims_success() {
        let snapshot = MigrationStats::new().snapshot();
        let report = MigrationReport::new(
            MigrationStatus::Interrupted,
            &snapshot,
            Some(&MigrationError::Interrupted),
            5,
        );
        assert!(!report.is_success());
        let lines = report.summary_lines();
        assert!(lines[0].starts_with("Migration interrupted"));
        assert!(lines.iter().all(|line| !line.contains("completed")));
    }
}
