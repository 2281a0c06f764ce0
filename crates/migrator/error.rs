use chainmig_storage::error::StoreError;
use ethereum_types::H256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("DB error: {0}")]
    Store(#[from] StoreError),
    #[error("No canonical blocks found in source")]
    EmptyCanonicalChain,
    #[error("No canonical hash for tip block #{0}")]
    MissingTipCanonicalHash(u64),
    #[error("Header for tip block #{number} ({hash:#x}) is missing from the destination")]
    MissingTipHeader { number: u64, hash: H256 },
    #[error("Migration interrupted")]
    Interrupted,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Migration worker failed: {0}")]
    Worker(String),
}

impl MigrationError {
    /// `true` when the run stopped because of a cancellation request rather
    /// than a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}
