//! Variable-length integer encoding utilities.
//!
//! Seven bits per byte, low bits first, high bit set on every byte except the
//! last. Used by the document, query and snapshot encodings.

use crate::error::{QuarryError, Result};

/// Append `value` to `buf` using variable-length encoding.
pub fn encode_u64(buf: &mut Vec<u8>, value: u64) {
    let mut val = value;

    loop {
        let mut byte = (val & 0x7F) as u8;
        val >>= 7;

        if val != 0 {
            byte |= 0x80; // continuation bit
        }

        buf.push(byte);

        if val == 0 {
            break;
        }
    }
}

/// Decode a u64 value from variable-length encoding.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0;
    let mut bytes_read = 0;

    for &byte in bytes {
        bytes_read += 1;

        if shift >= 64 {
            return Err(QuarryError::serialisation("VarInt overflow"));
        }

        result |= ((byte & 0x7F) as u64) << shift;

        if (byte & 0x80) == 0 {
            return Ok((result, bytes_read));
        }

        shift += 7;
    }

    Err(QuarryError::serialisation("Incomplete VarInt"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_u64() {
        let test_values = [0, 1, 127, 128, 255, 256, 16383, 16384, u64::MAX];

        for &value in &test_values {
            let mut encoded = Vec::new();
            encode_u64(&mut encoded, value);
            let (decoded, bytes_read) = decode_u64(&encoded).unwrap();

            assert_eq!(value, decoded);
            assert_eq!(encoded.len(), bytes_read);
        }
    }

    #[test]
    fn test_small_values_use_one_byte() {
        let mut encoded = Vec::new();
        encode_u64(&mut encoded, 127);
        assert_eq!(encoded, vec![0x7F]);
    }

    #[test]
    fn test_incomplete_varint() {
        assert!(decode_u64(&[0x80, 0x80]).is_err());
        assert!(decode_u64(&[]).is_err());
    }
}
