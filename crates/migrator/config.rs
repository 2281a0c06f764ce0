use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    error::MigrationError,
    namespace::Namespace,
    partition::{DEFAULT_ARCHIVE_TYPE, DEFAULT_FINALITY_DELAY},
};

pub const DEFAULT_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    /// Prefix stripped from source keys. `None` leaves keys untouched.
    pub namespace: Option<Namespace>,
    /// Scan the source for a namespace when none is configured.
    pub detect_namespace: bool,
    /// Writes per destination batch. Only affects I/O granularity.
    pub batch_size: usize,
    pub finality_delay: u64,
    pub archive_type: String,
    pub monitor_interval_secs: u64,
    /// Head height to commit instead of the highest reconstructed block.
    pub tip_height: Option<u64>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::new(),
            destination_path: PathBuf::new(),
            namespace: None,
            detect_namespace: false,
            batch_size: DEFAULT_BATCH_SIZE,
            finality_delay: DEFAULT_FINALITY_DELAY,
            archive_type: DEFAULT_ARCHIVE_TYPE.to_string(),
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
            tip_height: None,
        }
    }
}

impl MigrationConfig {
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.batch_size == 0 {
            return Err(MigrationError::InvalidConfig(
                "batch size must be greater than zero".to_string(),
            ));
        }
        if self.monitor_interval_secs == 0 {
            return Err(MigrationError::InvalidConfig(
                "monitor interval must be greater than zero".to_string(),
            ));
        }
        if self.archive_type.trim().is_empty() {
            return Err(MigrationError::InvalidConfig(
                "archive type must not be empty".to_string(),
            ));
        }
        if !self.source_path.as_os_str().is_empty() && self.source_path == self.destination_path
        {
            return Err(MigrationError::InvalidConfig(format!(
                "source and destination are the same path: {}",
                self.source_path.display()
            )));
        }
        Ok(())
    }
}
