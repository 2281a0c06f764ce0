use chainmig_rlp::error::RLPDecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksdbError(#[from] rocksdb::Error),
    #[error(transparent)]
    RLPDecode(#[from] RLPDecodeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Lock error: Poisoned")]
    LockError,
    #[error("Store at {0} is opened read-only")]
    ReadOnly(String),
    #[error("Value for key {key} has unexpected length {actual} (expected {expected})")]
    InvalidValueLength {
        key: String,
        actual: usize,
        expected: usize,
    },
    #[error("{0}")]
    Custom(String),
}
