//! Destination key schema (go-ethereum `core/rawdb/schema.go` layout).
//!
//! | Data              | Key format                         | Value                 |
//! |-------------------|------------------------------------|-----------------------|
//! | Canonical hash    | `"h" + num(8 BE) + "n"`            | hash (32)             |
//! | Block number      | `"H" + hash(32)`                   | num (8 BE)            |
//! | Block header      | `"h" + num(8 BE) + hash(32)`       | RLP header            |
//! | Block body        | `"b" + num(8 BE) + hash(32)`       | RLP body              |
//! | Block receipts    | `"r" + num(8 BE) + hash(32)`       | RLP receipts          |
//! | Total difficulty  | `"t" + num(8 BE) + hash(32)`       | RLP big integer       |
//! | Contract code     | `"c" + hash(32)`                   | code                  |
//! | Head pointers     | `"LastHeader"`, `"LastBlock"`, ... | hash (32) / num (8 BE)|

use ethereum_types::H256;

pub const HEADER_PREFIX: u8 = b'h';
pub const HEADER_HASH_SUFFIX: u8 = b'n';
pub const HEADER_NUMBER_PREFIX: u8 = b'H';
pub const BODY_PREFIX: u8 = b'b';
pub const RECEIPTS_PREFIX: u8 = b'r';
pub const TD_PREFIX: u8 = b't';
pub const CODE_PREFIX: u8 = b'c';

pub const HASH_LENGTH: usize = 32;
pub const NUMBER_LENGTH: usize = 8;

/// `"h" + num + "n"`
pub const CANONICAL_KEY_LENGTH: usize = 1 + NUMBER_LENGTH + 1;
/// `"H" + num`, the inverted canonical layout some sources use.
pub const INVERTED_CANONICAL_KEY_LENGTH: usize = 1 + NUMBER_LENGTH;
/// `prefix + num + hash`
pub const BLOCK_KEY_LENGTH: usize = 1 + NUMBER_LENGTH + HASH_LENGTH;
/// `"c" + hash` and `"H" + hash`
pub const HASH_KEY_LENGTH: usize = 1 + HASH_LENGTH;

pub const HEAD_HEADER_KEY: &[u8] = b"LastHeader";
pub const HEAD_BLOCK_KEY: &[u8] = b"LastBlock";
pub const HEAD_FAST_BLOCK_KEY: &[u8] = b"LastFast";
pub const LAST_ACCEPTED_KEY: &[u8] = b"lastAccepted";
pub const HEIGHT_KEY: &[u8] = b"height";
pub const LAST_ACCEPTED_HEIGHT_KEY: &[u8] = b"lastAcceptedHeight";
pub const INITIALIZED_KEY: &[u8] = b"initialized";

/// Set on the live store once the archival backend holds everything below it.
pub const ANCIENT_CUTOFF_KEY: &[u8] = b"ancientCutoff";

/// Keys holding the tip hash.
pub const HEAD_HASH_KEYS: [&[u8]; 4] = [
    HEAD_HEADER_KEY,
    HEAD_BLOCK_KEY,
    HEAD_FAST_BLOCK_KEY,
    LAST_ACCEPTED_KEY,
];

/// Every key written by the head commit. None of these may reach the
/// destination from anywhere else.
pub const RESERVED_HEAD_KEYS: [&[u8]; 7] = [
    HEAD_HEADER_KEY,
    HEAD_BLOCK_KEY,
    HEAD_FAST_BLOCK_KEY,
    LAST_ACCEPTED_KEY,
    HEIGHT_KEY,
    LAST_ACCEPTED_HEIGHT_KEY,
    INITIALIZED_KEY,
];

pub fn is_reserved_head_key(key: &[u8]) -> bool {
    RESERVED_HEAD_KEYS.iter().any(|reserved| *reserved == key)
}

pub fn encode_block_number(number: u64) -> [u8; NUMBER_LENGTH] {
    number.to_be_bytes()
}

/// Reads a big-endian block number from the first 8 bytes.
pub fn decode_block_number(bytes: &[u8]) -> Option<u64> {
    let raw: [u8; NUMBER_LENGTH] = bytes.get(..NUMBER_LENGTH)?.try_into().ok()?;
    Some(u64::from_be_bytes(raw))
}

/// `"h" + num(8 BE) + "n"` → canonical block hash
pub fn canonical_hash_key(number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(CANONICAL_KEY_LENGTH);
    key.push(HEADER_PREFIX);
    key.extend_from_slice(&encode_block_number(number));
    key.push(HEADER_HASH_SUFFIX);
    key
}

/// `"H" + hash(32)` → block number (8-byte BE)
pub fn header_number_key(hash: H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(HASH_KEY_LENGTH);
    key.push(HEADER_NUMBER_PREFIX);
    key.extend_from_slice(hash.as_bytes());
    key
}

fn block_key(prefix: u8, number: u64, hash: H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(BLOCK_KEY_LENGTH);
    key.push(prefix);
    key.extend_from_slice(&encode_block_number(number));
    key.extend_from_slice(hash.as_bytes());
    key
}

/// `"h" + num(8 BE) + hash(32)` → RLP-encoded block header
pub fn header_key(number: u64, hash: H256) -> Vec<u8> {
    block_key(HEADER_PREFIX, number, hash)
}

/// `"b" + num(8 BE) + hash(32)` → RLP-encoded block body
pub fn body_key(number: u64, hash: H256) -> Vec<u8> {
    block_key(BODY_PREFIX, number, hash)
}

/// `"r" + num(8 BE) + hash(32)` → RLP-encoded receipts
pub fn receipts_key(number: u64, hash: H256) -> Vec<u8> {
    block_key(RECEIPTS_PREFIX, number, hash)
}

/// `"t" + num(8 BE) + hash(32)` → RLP-encoded total difficulty
pub fn td_key(number: u64, hash: H256) -> Vec<u8> {
    block_key(TD_PREFIX, number, hash)
}

/// `"c" + hash(32)` → contract code
pub fn code_key(hash: H256) -> Vec<u8> {
    let mut key = Vec::with_capacity(HASH_KEY_LENGTH);
    key.push(CODE_PREFIX);
    key.extend_from_slice(hash.as_bytes());
    key
}
