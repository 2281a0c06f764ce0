//! Tenant prefix handling.
//!
//! Subnet-style sources store every chain key behind a fixed 32-byte prefix,
//! but bare keys may coexist with prefixed ones in the same store.

use std::{collections::HashMap, fmt, str::FromStr};

use chainmig_storage::{
    api::{
        SourceStore,
        schema::{
            BLOCK_KEY_LENGTH, BODY_PREFIX, CANONICAL_KEY_LENGTH, HASH_KEY_LENGTH,
            HEADER_NUMBER_PREFIX, HEADER_PREFIX, INVERTED_CANONICAL_KEY_LENGTH, RECEIPTS_PREFIX,
        },
    },
    error::StoreError,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::error::MigrationError;

pub const NAMESPACE_LENGTH: usize = 32;

/// Upper bound on keys inspected by [`detect_namespace`].
pub const DEFAULT_DETECTION_SCAN_LIMIT: usize = 100_000;

/// Chain-shaped keys that must share a prefix before it is taken as the
/// namespace. A single bare key can look namespaced by accident.
pub const CONFIRMING_KEYS: usize = 2;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace([u8; NAMESPACE_LENGTH]);

impl Namespace {
    pub const fn new(bytes: [u8; NAMESPACE_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Returns `None` unless `bytes` is exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Strips this namespace off `key` if it is an exact prefix.
    pub fn strip<'a>(&self, key: &'a [u8]) -> &'a [u8] {
        key.strip_prefix(self.0.as_slice()).unwrap_or(key)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({self})")
    }
}

impl FromStr for Namespace {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| MigrationError::InvalidConfig(format!("namespace is not hex: {e}")))?;
        Self::from_slice(&bytes).ok_or_else(|| {
            MigrationError::InvalidConfig(format!(
                "namespace must be {NAMESPACE_LENGTH} bytes, got {}",
                bytes.len()
            ))
        })
    }
}

impl Serialize for Namespace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Returns `key` without the namespace prefix, or `key` unchanged when it does
/// not start with it (or no namespace is configured).
pub fn strip_namespace<'a>(key: &'a [u8], namespace: Option<&Namespace>) -> &'a [u8] {
    match namespace {
        Some(namespace) => namespace.strip(key),
        None => key,
    }
}

/// Looks for a prefix shared by keys shaped like `namespace(32) + chain key`.
///
/// A candidate must carry one of `h`, `b`, `r`, `H` right after the first 32
/// bytes and the remainder must have the length of a known chain key layout.
/// The first prefix seen on [`CONFIRMING_KEYS`] candidates wins. Returns
/// `Ok(None)` when no prefix is confirmed within `scan_limit` keys.
pub fn detect_namespace(
    source: &dyn SourceStore,
    scan_limit: usize,
) -> Result<Option<Namespace>, StoreError> {
    let mut candidates: HashMap<Namespace, usize> = HashMap::new();
    for (scanned, entry) in source.iter_all()?.take(scan_limit).enumerate() {
        let (key, _) = entry?;
        let Some(namespace) = namespace_candidate(&key) else {
            continue;
        };
        let seen = candidates.entry(namespace).or_default();
        *seen += 1;
        if *seen >= CONFIRMING_KEYS {
            info!(
                "[MIGRATION] Detected namespace {namespace} after scanning {} keys",
                scanned + 1
            );
            return Ok(Some(namespace));
        }
    }
    debug!(
        "[MIGRATION] No namespace confirmed in the first {scan_limit} keys ({} unconfirmed prefixes)",
        candidates.len()
    );
    Ok(None)
}

fn namespace_candidate(key: &[u8]) -> Option<Namespace> {
    if key.len() <= NAMESPACE_LENGTH {
        return None;
    }
    let (prefix, rest) = key.split_at(NAMESPACE_LENGTH);
    let known_layout = match rest[0] {
        HEADER_PREFIX => rest.len() == BLOCK_KEY_LENGTH || rest.len() == CANONICAL_KEY_LENGTH,
        BODY_PREFIX | RECEIPTS_PREFIX => rest.len() == BLOCK_KEY_LENGTH,
        HEADER_NUMBER_PREFIX => {
            rest.len() == INVERTED_CANONICAL_KEY_LENGTH || rest.len() == HASH_KEY_LENGTH
        }
        _ => false,
    };
    known_layout.then(|| Namespace::from_slice(prefix)).flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainmig_storage::InMemoryBackend;

    const NS: Namespace = Namespace::new([0xab; NAMESPACE_LENGTH]);

    fn prefixed(key: &[u8]) -> Vec<u8> {
        [NS.as_bytes(), key].concat()
    }

    #[test]
    fn strips_exact_prefix_only() {
        let key = prefixed(b"LastBlock");
        assert_eq!(strip_namespace(&key, Some(&NS)), b"LastBlock");

        let bare = b"LastBlock".as_slice();
        assert_eq!(strip_namespace(bare, Some(&NS)), bare);
        assert_eq!(strip_namespace(&key, None), key.as_slice());

        let mut almost = key.clone();
        almost[31] = 0x00;
        assert_eq!(strip_namespace(&almost, Some(&NS)), almost.as_slice());
    }

    #[test]
    fn stripping_is_idempotent_on_bare_keys() {
        let key = prefixed(b"code");
        let once = strip_namespace(&key, Some(&NS));
        assert_eq!(strip_namespace(once, Some(&NS)), once);
    }

    #[test]
    fn parses_hex_with_and_without_prefix() {
        let hex = "ab".repeat(NAMESPACE_LENGTH);
        assert_eq!(hex.parse::<Namespace>().expect("parse"), NS);
        assert_eq!(format!("0x{hex}").parse::<Namespace>().expect("parse"), NS);
        assert!("abcd".parse::<Namespace>().is_err());
        assert!("zz".parse::<Namespace>().is_err());
    }

    #[test]
    fn serializes_as_hex_string() {
        let encoded = serde_json::to_string(&NS).expect("serialize");
        assert_eq!(encoded, format!("\"0x{}\"", "ab".repeat(NAMESPACE_LENGTH)));
        let decoded: Namespace = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(decoded, NS);
    }

    #[test]
    fn detects_namespace_from_prefixed_header_key() {
        let mut header = vec![b'h'];
        header.extend_from_slice(&1u64.to_be_bytes());
        header.extend_from_slice(&[0x11; 32]);

        let mut canonical = vec![b'h'];
        canonical.extend_from_slice(&1u64.to_be_bytes());
        canonical.push(b'n');

        let source = InMemoryBackend::from_entries([
            (b"bare-key".to_vec(), b"v".to_vec()),
            (prefixed(&header), vec![0xc0]),
            (prefixed(&canonical), vec![0x11; 32]),
        ]);
        assert_eq!(
            detect_namespace(&source, DEFAULT_DETECTION_SCAN_LIMIT).expect("detect"),
            Some(NS)
        );
    }

    fn inverted_canonical(number: u64) -> Vec<u8> {
        let mut key = vec![b'H'];
        key.extend_from_slice(&number.to_be_bytes());
        key
    }

    #[test]
    fn detection_respects_scan_limit() {
        let source = InMemoryBackend::from_entries([
            (vec![0x00], b"v".to_vec()),
            (prefixed(&inverted_canonical(0)), vec![0x22; 32]),
            (prefixed(&inverted_canonical(1)), vec![0x23; 32]),
        ]);
        assert_eq!(detect_namespace(&source, 2).expect("detect"), None);
        assert_eq!(detect_namespace(&source, 3).expect("detect"), Some(NS));
    }

    #[test]
    fn single_chain_shaped_bare_key_is_not_a_namespace() {
        // `h` + number + hash whose byte 23 is `H`: the tail past offset 32
        // looks like an inverted canonical key.
        let mut hash = [0x11; 32];
        hash[23] = b'H';
        let mut bare_header = vec![b'h'];
        bare_header.extend_from_slice(&0u64.to_be_bytes());
        bare_header.extend_from_slice(&hash);
        assert!(namespace_candidate(&bare_header).is_some());

        let lone = InMemoryBackend::from_entries([(bare_header.clone(), vec![0xc0])]);
        assert_eq!(
            detect_namespace(&lone, DEFAULT_DETECTION_SCAN_LIMIT).expect("detect"),
            None
        );

        let mixed = InMemoryBackend::from_entries([
            (bare_header, vec![0xc0]),
            (prefixed(&inverted_canonical(0)), vec![0x22; 32]),
            (prefixed(&inverted_canonical(1)), vec![0x23; 32]),
        ]);
        assert_eq!(
            detect_namespace(&mixed, DEFAULT_DETECTION_SCAN_LIMIT).expect("detect"),
            Some(NS)
        );
    }

    #[test]
    fn unknown_layouts_are_not_candidates() {
        let source = InMemoryBackend::from_entries([(prefixed(b"hello"), b"v".to_vec())]);
        assert_eq!(
            detect_namespace(&source, DEFAULT_DETECTION_SCAN_LIMIT).expect("detect"),
            None
        );
    }
}
