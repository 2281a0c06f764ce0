use ethereum_types::U256;

use crate::{
    constants::{RLP_EMPTY_LIST, RLP_NULL},
    error::RLPDecodeError,
};

pub trait RLPDecode: Sized {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError>;

    fn decode(rlp: &[u8]) -> Result<Self, RLPDecodeError> {
        let (decoded, remaining) = Self::decode_unfinished(rlp)?;
        if !remaining.is_empty() {
            return Err(RLPDecodeError::InvalidLength);
        }
        Ok(decoded)
    }
}

/// Splits the first RLP item off `data`.
///
/// Returns `(is_list, payload, rest)`.
pub fn decode_rlp_item(data: &[u8]) -> Result<(bool, &[u8], &[u8]), RLPDecodeError> {
    let Some(&first) = data.first() else {
        return Err(RLPDecodeError::InvalidLength);
    };

    match first {
        0..RLP_NULL => Ok((false, &data[..1], &data[1..])),
        RLP_NULL..=0xb7 => {
            let len = (first - RLP_NULL) as usize;
            let (payload, rest) = split_payload(data, 1, len)?;
            if len == 1 && payload[0] < RLP_NULL {
                return Err(RLPDecodeError::InvalidCompression);
            }
            Ok((false, payload, rest))
        }
        0xb8..RLP_EMPTY_LIST => {
            let len_of_len = (first - 0xb7) as usize;
            let len = decode_length(data, len_of_len)?;
            let (payload, rest) = split_payload(data, 1 + len_of_len, len)?;
            Ok((false, payload, rest))
        }
        RLP_EMPTY_LIST..=0xf7 => {
            let len = (first - RLP_EMPTY_LIST) as usize;
            let (payload, rest) = split_payload(data, 1, len)?;
            Ok((true, payload, rest))
        }
        0xf8..=0xff => {
            let len_of_len = (first - 0xf7) as usize;
            let len = decode_length(data, len_of_len)?;
            let (payload, rest) = split_payload(data, 1 + len_of_len, len)?;
            Ok((true, payload, rest))
        }
    }
}

fn decode_length(data: &[u8], len_of_len: usize) -> Result<usize, RLPDecodeError> {
    let len_bytes = data
        .get(1..1 + len_of_len)
        .ok_or(RLPDecodeError::InvalidLength)?;
    if len_bytes.first() == Some(&0) || len_of_len > std::mem::size_of::<usize>() {
        return Err(RLPDecodeError::MalformedData);
    }
    let len = len_bytes
        .iter()
        .fold(0usize, |acc, byte| (acc << 8) | *byte as usize);
    if len <= 55 {
        return Err(RLPDecodeError::InvalidCompression);
    }
    Ok(len)
}

fn split_payload(
    data: &[u8],
    offset: usize,
    len: usize,
) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let end = offset
        .checked_add(len)
        .ok_or(RLPDecodeError::InvalidLength)?;
    if data.len() < end {
        return Err(RLPDecodeError::InvalidLength);
    }
    Ok((&data[offset..end], &data[end..]))
}

/// Decodes a byte string item, rejecting lists.
fn decode_bytes(data: &[u8]) -> Result<(&[u8], &[u8]), RLPDecodeError> {
    let (is_list, payload, rest) = decode_rlp_item(data)?;
    if is_list {
        return Err(RLPDecodeError::UnexpectedList);
    }
    Ok((payload, rest))
}

/// Returns `true` when `data` holds exactly one well-formed RLP list.
pub fn is_encoded_list(data: &[u8]) -> bool {
    matches!(decode_rlp_item(data), Ok((true, _, rest)) if rest.is_empty())
}

impl RLPDecode for U256 {
    fn decode_unfinished(rlp: &[u8]) -> Result<(Self, &[u8]), RLPDecodeError> {
        let (payload, rest) = decode_bytes(rlp)?;
        if payload.len() > 32 {
            return Err(RLPDecodeError::InvalidLength);
        }
        if payload.first() == Some(&0) {
            return Err(RLPDecodeError::MalformedData);
        }
        Ok((U256::from_big_endian(payload), rest))
    }
}
