//! Key-value storage for chain data migration.
//!
//! Provides the source/destination store traits, the go-ethereum rawdb key
//! schema and two backends: an in-memory map and RocksDB (behind the
//! `rocksdb` feature).

pub mod api;
pub mod backend;
pub mod error;
pub mod reader;

use std::{path::Path, sync::Arc};

pub use api::{
    KeyValue, KeyValueIter, KeyValueReader, SourceStore, StorageBackend, StorageWriteBatch,
};
pub use backend::in_memory::InMemoryBackend;
pub use error::StoreError;
pub use reader::ChainDataReader;

/// Storage backend type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineType {
    /// In-memory storage, non-persistent. Suitable for testing.
    InMemory,
    /// RocksDB storage, persistent.
    #[cfg(feature = "rocksdb")]
    RocksDB,
}

/// Opens the store to migrate from. RocksDB sources are opened read-only.
pub fn open_source_store(
    path: impl AsRef<Path>,
    engine: EngineType,
) -> Result<Arc<dyn SourceStore>, StoreError> {
    // Ignore unused variable warning when compiling without DB features
    let _db_path = path.as_ref();
    match engine {
        EngineType::InMemory => Ok(Arc::new(InMemoryBackend::new())),
        #[cfg(feature = "rocksdb")]
        EngineType::RocksDB => Ok(Arc::new(backend::rocksdb::RocksDBBackend::open_read_only(
            path,
        )?)),
    }
}

/// Opens (creating if needed) the store to migrate into.
pub fn open_destination_store(
    path: impl AsRef<Path>,
    engine: EngineType,
) -> Result<Arc<dyn StorageBackend>, StoreError> {
    let _db_path = path.as_ref();
    match engine {
        EngineType::InMemory => Ok(Arc::new(InMemoryBackend::new())),
        #[cfg(feature = "rocksdb")]
        EngineType::RocksDB => Ok(Arc::new(backend::rocksdb::RocksDBBackend::open(path)?)),
    }
}
