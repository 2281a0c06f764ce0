//! Chain-data migration engine.
//!
//! Reads a namespaced, per-block-keyed source store, reconstructs the
//! canonical chain and its total-difficulty ledger, and writes everything into
//! a destination laid out with the go-ethereum rawdb schema. Head pointers are
//! committed last, in their own atomic batch.

pub mod classify;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod monitor;
pub mod namespace;
pub mod partition;
pub mod pipeline;
pub mod reconstruct;
pub mod report;
pub mod stats;
pub mod verify;
pub mod writer;

pub use classify::{ClassifiedRecord, RecordKind, classify};
pub use config::MigrationConfig;
pub use error::MigrationError;
pub use namespace::{Namespace, detect_namespace, strip_namespace};
pub use pipeline::{MigrationOutcome, migrate, run_migration};
pub use reconstruct::{CanonicalChain, CanonicalReconstructor, ReconstructionMode};
pub use stats::{MigrationPhase, MigrationStats, StatsSnapshot};
pub use verify::{VerificationReport, verify_destination};
