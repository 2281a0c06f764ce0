pub const RLP_NULL: u8 = 0x80;
pub const RLP_EMPTY_LIST: u8 = 0xc0;

/// Largest payload that fits in a single-byte length prefix.
pub const SHORT_PAYLOAD_MAX: usize = 55;

