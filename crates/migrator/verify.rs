//! Read-only consistency check of a migrated destination.

use chainmig_storage::{
    ChainDataReader, KeyValueReader,
    api::schema::{HEAD_BLOCK_KEY, HEAD_HASH_KEYS},
};
use ethereum_types::{H256, U256};
use serde::Serialize;
use tracing::info;

use crate::error::MigrationError;

/// Failures kept verbatim in the report; the rest are only counted.
pub const MAX_REPORTED_FAILURES: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    pub head_hash: Option<H256>,
    pub head_number: Option<u64>,
    pub height: Option<u64>,
    pub checked_blocks: u64,
    pub missing_canonical: u64,
    pub reverse_mismatches: u64,
    pub td_mismatches: u64,
    pub head_failures: u64,
    pub failures: Vec<String>,
}

impl VerificationReport {
    pub fn is_ok(&self) -> bool {
        self.head_failures == 0
            && self.missing_canonical == 0
            && self.reverse_mismatches == 0
            && self.td_mismatches == 0
    }

    fn head_failure(&mut self, message: String) {
        self.head_failures += 1;
        self.note(message);
    }

    fn note(&mut self, message: String) {
        if self.failures.len() < MAX_REPORTED_FAILURES {
            self.failures.push(message);
        }
    }
}

/// Checks head pointers, canonical/reverse mappings and the TD ledger of
/// `store`. Inconsistencies are collected into the report; only storage
/// errors fail the call.
pub fn verify_destination<R: KeyValueReader + ?Sized>(
    store: &R,
) -> Result<VerificationReport, MigrationError> {
    let reader = ChainDataReader::new(store);
    let mut report = VerificationReport::default();

    let head_hash = reader.read_head_hash(HEAD_BLOCK_KEY)?;
    for key in HEAD_HASH_KEYS {
        let name = String::from_utf8_lossy(key);
        match reader.read_head_hash(key)? {
            None => report.head_failure(format!("head pointer {name} is missing")),
            Some(hash) if Some(hash) != head_hash => {
                report.head_failure(format!("head pointer {name} points to {hash:#x}"))
            }
            Some(_) => {}
        }
    }
    report.head_hash = head_hash;
    report.height = reader.read_height()?;

    let Some(head_hash) = head_hash else {
        return Ok(report);
    };
    let Some(head_number) = reader.read_block_number(head_hash)? else {
        report.head_failure(format!("head {head_hash:#x} has no block number"));
        return Ok(report);
    };
    report.head_number = Some(head_number);
    // The walk below is bounded by the head number, so it has to be backed by
    // a canonical entry first.
    if reader.read_canonical_hash(head_number)? != Some(head_hash) {
        report.head_failure(format!(
            "head {head_hash:#x} is not the canonical hash of #{head_number}"
        ));
        return Ok(report);
    }
    if report.height != Some(head_number) {
        report.head_failure(format!(
            "height {:?} does not match head block #{head_number}",
            report.height
        ));
    }

    for number in 0..=head_number {
        report.checked_blocks += 1;
        let Some(hash) = reader.read_canonical_hash(number)? else {
            report.missing_canonical += 1;
            report.note(format!("#{number} has no canonical hash"));
            continue;
        };
        if reader.read_block_number(hash)? != Some(number) {
            report.reverse_mismatches += 1;
            report.note(format!("reverse entry for {hash:#x} does not point to #{number}"));
        }
        let expected = U256::from(number) + U256::one();
        if reader.read_total_difficulty(number, hash)? != Some(expected) {
            report.td_mismatches += 1;
            report.note(format!("#{number} total difficulty is not {expected}"));
        }
    }

    info!(
        "[MIGRATION] Verified {} blocks up to #{head_number}: {}",
        report.checked_blocks,
        if report.is_ok() { "ok" } else { "inconsistent" }
    );
    Ok(report)
}
