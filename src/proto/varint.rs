//! Base-128 varints as used by the protobuf wire format.

use bytes::BufMut;

use crate::error::DecodeError;

/// Longest encoding of a 64-bit value.
pub const MAX_VARINT_LEN: usize = 10;

pub fn put_varint(dst: &mut impl BufMut, mut value: u64) {
    while value >= 0x80 {
        dst.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

#[must_use]
pub const fn varint_len(value: u64) -> usize {
    // bits needed, rounded up to 7-bit groups, at least one byte
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Decode a varint from the front of `buf`.
///
/// Returns the value and the number of bytes consumed. `offset` is only used
/// to report where the varint started.
pub fn read_varint(buf: &[u8], offset: usize) -> Result<(u64, usize), DecodeError> {
    let mut value = 0u64;
    for (i, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        let bits = u64::from(byte & 0x7F);
        if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
            return Err(DecodeError::VarintOverflow { offset });
        }
        value |= bits << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(DecodeError::TruncatedVarint { offset })
}
