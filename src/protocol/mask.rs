//! Payload masking (RFC 6455 Section 5.3).
//!
//! Masking is an XOR with a repeating 4-byte key, so applying the same key
//! twice restores the original payload.

/// Byte-by-byte XOR masking.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Word-at-a-time masking: XORs 4-byte chunks as `u32`, then the tail.
#[inline]
pub fn apply_mask_fast(data: &mut [u8], mask: [u8; 4]) {
    let mask_u32 = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let val = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        chunk.copy_from_slice(&(val ^ mask_u32).to_ne_bytes());
    }
    for (i, byte) in chunks.into_remainder().iter_mut().enumerate() {
        *byte ^= mask[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASK: [u8; 4] = [0x37, 0xfa, 0x21, 0x3d];

    #[test]
    fn test_rfc_example() {
        // RFC 6455 Section 5.7: masked "Hello"
        let mut data = *b"Hello";
        apply_mask(&mut data, MASK);
        assert_eq!(data, [0x7f, 0x9f, 0x4d, 0x51, 0x58]);
    }

    #[test]
    fn test_mask_is_involution() {
        let original: Vec<u8> = (0..=255).collect();
        let mut data = original.clone();
        apply_mask_fast(&mut data, MASK);
        assert_ne!(data, original);
        apply_mask_fast(&mut data, MASK);
        assert_eq!(data, original);
    }

    #[test]
    fn test_fast_matches_scalar_for_all_tail_lengths() {
        for len in 0..16 {
            let mut scalar: Vec<u8> = (0..len as u8).collect();
            let mut fast = scalar.clone();
            apply_mask(&mut scalar, MASK);
            apply_mask_fast(&mut fast, MASK);
            assert_eq!(scalar, fast, "length {}", len);
        }
    }
}
