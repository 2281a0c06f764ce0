//! Recursive Length Prefix encoding, limited to what chain-data migration needs:
//! scalar and byte-string items, plus enough list decoding to recognise
//! RLP-encoded headers, bodies and receipts.

pub mod constants;
pub mod decode;
pub mod encode;
pub mod error;
