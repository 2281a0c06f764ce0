//! Key classification.
//!
//! Maps a namespace-stripped `(key, value)` pair to exactly one record kind,
//! looking only at the key length, bytes at fixed offsets and, for headers,
//! the RLP list marker in `value[0]`. Rules are tried in this order:
//!
//! | # | Key shape                              | Record                       |
//! |---|----------------------------------------|------------------------------|
//! | 1 | len 9,  `H` + num                      | `Canonical` (inverted form)  |
//! | 2 | len 10, `h` + num + `n`                | `Canonical`                  |
//! | 3 | len 41, `h` + num + hash               | `Header`                     |
//! | 4 | len 41, `b` + num + hash               | `Body`                       |
//! | 5 | len 41, `r` + num + hash               | `Receipts`                   |
//! | 6 | len 33, `c` + hash                     | `Code`                       |
//! | 7 | len 32                                 | `StateNode`                  |
//! | 8 | empty key or reserved head pointer     | `Skipped`                    |
//! | 9 | anything else                          | `Other`                      |
//!
//! Canonical values must be 32-byte hashes and header values must be RLP
//! lists; anything failing those checks falls back to `Other`. Classification
//! never fails.

use chainmig_rlp::constants::RLP_EMPTY_LIST;
use chainmig_storage::api::schema::{
    BLOCK_KEY_LENGTH, BODY_PREFIX, CANONICAL_KEY_LENGTH, CODE_PREFIX, HASH_KEY_LENGTH,
    HASH_LENGTH, HEADER_HASH_SUFFIX, HEADER_NUMBER_PREFIX, HEADER_PREFIX,
    INVERTED_CANONICAL_KEY_LENGTH, NUMBER_LENGTH, RECEIPTS_PREFIX, decode_block_number,
    is_reserved_head_key,
};
use ethereum_types::H256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifiedRecord<'a> {
    Canonical { number: u64, hash: H256 },
    Header { number: u64, hash: H256, bytes: &'a [u8] },
    Body { number: u64, hash: H256, bytes: &'a [u8] },
    Receipts { number: u64, hash: H256, bytes: &'a [u8] },
    Code { hash: H256, bytes: &'a [u8] },
    StateNode { hash: H256, bytes: &'a [u8] },
    Other { key: &'a [u8], value: &'a [u8] },
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Canonical,
    Header,
    Body,
    Receipts,
    Code,
    StateNode,
    Other,
    Skipped,
}

impl ClassifiedRecord<'_> {
    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Canonical { .. } => RecordKind::Canonical,
            Self::Header { .. } => RecordKind::Header,
            Self::Body { .. } => RecordKind::Body,
            Self::Receipts { .. } => RecordKind::Receipts,
            Self::Code { .. } => RecordKind::Code,
            Self::StateNode { .. } => RecordKind::StateNode,
            Self::Other { .. } => RecordKind::Other,
            Self::Skipped => RecordKind::Skipped,
        }
    }

    /// Whether the entry is copied to the destination as-is during the scan.
    ///
    /// Canonical pointers are not: they are rewritten from the reconstructed
    /// chain once the scan is complete.
    pub fn is_passthrough(&self) -> bool {
        !matches!(self, Self::Canonical { .. } | Self::Skipped)
    }
}

pub fn classify<'a>(key: &'a [u8], value: &'a [u8]) -> ClassifiedRecord<'a> {
    let other = ClassifiedRecord::Other { key, value };

    match (key.len(), key.first().copied()) {
        (0, _) => ClassifiedRecord::Skipped,
        (INVERTED_CANONICAL_KEY_LENGTH, Some(HEADER_NUMBER_PREFIX)) => {
            canonical(key, value).unwrap_or(other)
        }
        (CANONICAL_KEY_LENGTH, Some(HEADER_PREFIX))
            if key[CANONICAL_KEY_LENGTH - 1] == HEADER_HASH_SUFFIX =>
        {
            canonical(key, value).unwrap_or(other)
        }
        (BLOCK_KEY_LENGTH, Some(HEADER_PREFIX)) => {
            if !is_rlp_list_start(value) {
                return other;
            }
            let (number, hash) = block_key_parts(key);
            ClassifiedRecord::Header {
                number,
                hash,
                bytes: value,
            }
        }
        (BLOCK_KEY_LENGTH, Some(BODY_PREFIX)) => {
            let (number, hash) = block_key_parts(key);
            ClassifiedRecord::Body {
                number,
                hash,
                bytes: value,
            }
        }
        (BLOCK_KEY_LENGTH, Some(RECEIPTS_PREFIX)) => {
            let (number, hash) = block_key_parts(key);
            ClassifiedRecord::Receipts {
                number,
                hash,
                bytes: value,
            }
        }
        (HASH_KEY_LENGTH, Some(CODE_PREFIX)) => ClassifiedRecord::Code {
            hash: H256::from_slice(&key[1..]),
            bytes: value,
        },
        (HASH_LENGTH, _) => ClassifiedRecord::StateNode {
            hash: H256::from_slice(key),
            bytes: value,
        },
        _ if is_reserved_head_key(key) => ClassifiedRecord::Skipped,
        _ => other,
    }
}

fn canonical<'a>(key: &[u8], value: &[u8]) -> Option<ClassifiedRecord<'a>> {
    if value.len() != HASH_LENGTH {
        return None;
    }
    Some(ClassifiedRecord::Canonical {
        number: decode_block_number(&key[1..])?,
        hash: H256::from_slice(value),
    })
}

/// Splits `prefix + num(8) + hash(32)`. Callers check the length.
fn block_key_parts(key: &[u8]) -> (u64, H256) {
    let mut number = [0u8; NUMBER_LENGTH];
    number.copy_from_slice(&key[1..1 + NUMBER_LENGTH]);
    (
        u64::from_be_bytes(number),
        H256::from_slice(&key[1 + NUMBER_LENGTH..]),
    )
}

fn is_rlp_list_start(value: &[u8]) -> bool {
    value.first().is_some_and(|first| *first >= RLP_EMPTY_LIST)
}
