//! Counters shared between the migration worker and its observers.
//!
//! Only the worker mutates them; the monitor and the final report read them
//! through [`MigrationStats::snapshot`].

use std::{
    fmt,
    sync::{
        OnceLock,
        atomic::{AtomicU8, AtomicU64, Ordering},
    },
};

use ethereum_types::H256;
use serde::Serialize;

use crate::classify::RecordKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum MigrationPhase {
    Scanning = 0,
    Accumulating = 1,
    WritingBatches = 2,
    AwaitingTdCompletion = 3,
    CommittingHead = 4,
    Done = 5,
    Failed = 6,
    Interrupted = 7,
}

impl MigrationPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scanning => "scanning",
            Self::Accumulating => "accumulating",
            Self::WritingBatches => "writing_batches",
            Self::AwaitingTdCompletion => "awaiting_td_completion",
            Self::CommittingHead => "committing_head",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Interrupted)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Scanning,
            1 => Self::Accumulating,
            2 => Self::WritingBatches,
            3 => Self::AwaitingTdCompletion,
            4 => Self::CommittingHead,
            5 => Self::Done,
            6 => Self::Failed,
            _ => Self::Interrupted,
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
pub struct MigrationStats {
    total: AtomicU64,
    written: AtomicU64,
    headers: AtomicU64,
    bodies: AtomicU64,
    receipts: AtomicU64,
    total_difficulty: AtomicU64,
    canonical: AtomicU64,
    canonical_written: AtomicU64,
    state_nodes: AtomicU64,
    code: AtomicU64,
    other: AtomicU64,
    skipped: AtomicU64,
    batches: AtomicU64,
    phase: AtomicU8,
    /// Last non-terminal phase entered.
    reached: AtomicU8,
    max_block_number: OnceLock<u64>,
    tip: OnceLock<(u64, H256)>,
}

/// Point-in-time copy of [`MigrationStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
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
    pub batches: u64,
    pub phase: MigrationPhase,
    pub phase_reached: MigrationPhase,
    pub max_block_number: Option<u64>,
    pub tip_number: Option<u64>,
    pub tip_hash: Option<H256>,
}

impl MigrationStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_scanned(&self, kind: RecordKind) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let counter = match kind {
            RecordKind::Canonical => &self.canonical,
            RecordKind::Header => &self.headers,
            RecordKind::Body => &self.bodies,
            RecordKind::Receipts => &self.receipts,
            RecordKind::Code => &self.code,
            RecordKind::StateNode => &self.state_nodes,
            RecordKind::Other => &self.other,
            RecordKind::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_committed(&self, writes: usize) {
        self.written.fetch_add(writes as u64, Ordering::Relaxed);
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_canonical_pair(&self) {
        self.canonical_written.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_total_difficulty(&self) {
        self.total_difficulty.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_max_block_number(&self, number: u64) {
        let _ = self.max_block_number.set(number);
    }

    /// Records the selected tip. Set before the head is committed, so a failed
    /// run still reports which block it was heading for.
    pub(crate) fn set_tip(&self, number: u64, hash: H256) {
        let _ = self.tip.set((number, hash));
    }

    pub(crate) fn set_phase(&self, phase: MigrationPhase) {
        self.phase.store(phase as u8, Ordering::Release);
        if !phase.is_terminal() {
            self.reached.store(phase as u8, Ordering::Release);
        }
    }

    pub fn phase(&self) -> MigrationPhase {
        MigrationPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let tip = self.tip.get().copied();
        StatsSnapshot {
            total: load(&self.total),
            written: load(&self.written),
            headers: load(&self.headers),
            bodies: load(&self.bodies),
            receipts: load(&self.receipts),
            total_difficulty: load(&self.total_difficulty),
            canonical: load(&self.canonical),
            canonical_written: load(&self.canonical_written),
            state_nodes: load(&self.state_nodes),
            code: load(&self.code),
            other: load(&self.other),
            skipped: load(&self.skipped),
            batches: load(&self.batches),
            phase: self.phase(),
            phase_reached: MigrationPhase::from_u8(self.reached.load(Ordering::Acquire)),
            max_block_number: self.max_block_number.get().copied(),
            tip_number: tip.map(|(number, _)| number),
            tip_hash: tip.map(|(_, hash)| hash),
        }
    }
}
