//! Typed reads over a store laid out with the go-ethereum rawdb schema.

use chainmig_rlp::decode::RLPDecode;
use ethereum_types::{H256, U256};

use crate::{
    api::{
        KeyValueReader,
        schema::{
            HASH_LENGTH, HEIGHT_KEY, NUMBER_LENGTH, canonical_hash_key, header_key,
            header_number_key, td_key,
        },
    },
    error::StoreError,
};

/// Reads chain metadata from any [`KeyValueReader`].
pub struct ChainDataReader<'a, R: KeyValueReader + ?Sized> {
    reader: &'a R,
}

impl<'a, R: KeyValueReader + ?Sized> ChainDataReader<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    /// Returns the hash stored under a head pointer key such as `"LastBlock"`.
    pub fn read_head_hash(&self, key: &[u8]) -> Result<Option<H256>, StoreError> {
        self.reader
            .get(key)?
            .map(|raw| hash_from_value(key, &raw))
            .transpose()
    }

    /// Returns the block number for the given hash using the reverse index `"H" + hash`.
    pub fn read_block_number(&self, hash: H256) -> Result<Option<u64>, StoreError> {
        let key = header_number_key(hash);
        self.reader
            .get(&key)?
            .map(|raw| number_from_value(&key, &raw))
            .transpose()
    }

    /// Returns the canonical block hash for the given block number.
    ///
    /// Returns `None` if there is no canonical block at that number (e.g. above chain head).
    pub fn read_canonical_hash(&self, number: u64) -> Result<Option<H256>, StoreError> {
        let key = canonical_hash_key(number);
        self.reader
            .get(&key)?
            .map(|raw| hash_from_value(&key, &raw))
            .transpose()
    }

    pub fn read_total_difficulty(
        &self,
        number: u64,
        hash: H256,
    ) -> Result<Option<U256>, StoreError> {
        match self.reader.get(&td_key(number, hash))? {
            None => Ok(None),
            Some(raw) => Ok(Some(U256::decode(&raw)?)),
        }
    }

    /// Height recorded by the head commit under `"height"`.
    pub fn read_height(&self) -> Result<Option<u64>, StoreError> {
        self.reader
            .get(HEIGHT_KEY)?
            .map(|raw| number_from_value(HEIGHT_KEY, &raw))
            .transpose()
    }

    pub fn has_header(&self, number: u64, hash: H256) -> Result<bool, StoreError> {
        self.reader.contains(&header_key(number, hash))
    }
}

fn hash_from_value(key: &[u8], raw: &[u8]) -> Result<H256, StoreError> {
    if raw.len() != HASH_LENGTH {
        return Err(invalid_length(key, raw.len(), HASH_LENGTH));
    }
    Ok(H256::from_slice(raw))
}

fn number_from_value(key: &[u8], raw: &[u8]) -> Result<u64, StoreError> {
    let bytes: [u8; NUMBER_LENGTH] = raw
        .try_into()
        .map_err(|_| invalid_length(key, raw.len(), NUMBER_LENGTH))?;
    Ok(u64::from_be_bytes(bytes))
}

fn invalid_length(key: &[u8], actual: usize, expected: usize) -> StoreError {
    StoreError::InvalidValueLength {
        key: String::from_utf8_lossy(key).into_owned(),
        actual,
        expected,
    }
}
