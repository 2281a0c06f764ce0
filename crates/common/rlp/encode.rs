use bytes::BufMut;
use ethereum_types::U256;

use crate::constants::{RLP_EMPTY_LIST, RLP_NULL, SHORT_PAYLOAD_MAX};

pub trait RLPEncode {
    fn encode(&self, buf: &mut dyn BufMut);

    fn length(&self) -> usize {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len()
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}

/// Strips leading zero bytes from a big-endian integer.
fn minimal_be_bytes(bytes: &[u8]) -> &[u8] {
    let first_non_zero = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first_non_zero..]
}

/// Encodes the header of a list whose payload is `payload_len` bytes long.
pub fn encode_length(payload_len: usize, buf: &mut dyn BufMut) {
    encode_prefix(RLP_EMPTY_LIST, payload_len, buf);
}

fn encode_prefix(offset: u8, payload_len: usize, buf: &mut dyn BufMut) {
    if payload_len <= SHORT_PAYLOAD_MAX {
        buf.put_u8(offset + payload_len as u8);
    } else {
        let len_bytes = payload_len.to_be_bytes();
        let len_bytes = minimal_be_bytes(&len_bytes);
        buf.put_u8(offset + SHORT_PAYLOAD_MAX as u8 + len_bytes.len() as u8);
        buf.put_slice(len_bytes);
    }
}

impl RLPEncode for [u8] {
    fn encode(&self, buf: &mut dyn BufMut) {
        if self.len() == 1 && self[0] < RLP_NULL {
            buf.put_u8(self[0]);
            return;
        }
        encode_prefix(RLP_NULL, self.len(), buf);
        buf.put_slice(self);
    }
}

impl RLPEncode for U256 {
    fn encode(&self, buf: &mut dyn BufMut) {
        if self.is_zero() {
            buf.put_u8(RLP_NULL);
            return;
        }
        let bytes = self.to_big_endian();
        minimal_be_bytes(&bytes).encode(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn encodes_small_integers_inline() {
        assert_eq!(U256::from(1).encode_to_vec(), vec![0x01]);
        assert_eq!(U256::from(0x7f).encode_to_vec(), vec![0x7f]);
        assert_eq!(U256::from(0x80).encode_to_vec(), vec![0x81, 0x80]);
        assert_eq!(U256::from(1024).encode_to_vec(), vec![0x82, 0x04, 0x00]);
    }

    #[test]
    fn encodes_u256_like_geth_big_int() {
        assert_eq!(U256::zero().encode_to_vec(), vec![RLP_NULL]);
        assert_eq!(U256::from(3).encode_to_vec(), vec![0x03]);
        assert_eq!(U256::from(90_001u64).encode_to_vec(), hex!("83015f91").to_vec());
    }

    #[test]
    fn encodes_32_byte_string() {
        let encoded = [0xabu8; 32].as_slice().encode_to_vec();
        assert_eq!(encoded.len(), 33);
        assert_eq!(encoded[0], 0xa0);
    }

    #[test]
    fn encodes_long_strings_with_length_of_length() {
        let payload = [0x11u8; 60];
        let encoded = payload.as_slice().encode_to_vec();
        assert_eq!(&encoded[..2], &[0xb8, 60]);
        assert_eq!(encoded.len(), 62);
    }

    #[test]
    fn list_header_switches_to_long_form_past_55_bytes() {
        let mut short = Vec::new();
        encode_length(3, &mut short);
        assert_eq!(short, vec![0xc3]);

        let mut long = Vec::new();
        encode_length(300, &mut long);
        assert_eq!(long, vec![0xf9, 0x01, 0x2c]);
    }
}
