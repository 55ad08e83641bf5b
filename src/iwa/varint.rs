//! Variable-length integer encoding/decoding for IWA format
//!
//! iWork IWA files use Protocol Buffers variable-length encoding
//! for integers, which encodes values in 7-bit chunks with the
//! most significant bit indicating continuation.

/// Longest valid encoding of a u64
pub const MAX_VARINT_LEN: usize = 10;

/// Why a varint could not be decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    /// The input ended before the final byte (continuation bit still set)
    Truncated,
    /// More than ten bytes, or bits beyond the 64th
    Overflow,
}

/// Encode a u64 value as a variable-length integer
pub fn encode_varint(mut value: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(MAX_VARINT_LEN);
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
    buf
}

/// Decode a variable-length integer from the start of a byte slice.
///
/// Returns the value and the number of bytes consumed. An empty slice is
/// reported as [`VarintError::Truncated`]; callers that treat a clean end of
/// input as termination check for emptiness first.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut value: u64 = 0;

    for (index, &byte) in data.iter().enumerate() {
        if index == MAX_VARINT_LEN {
            return Err(VarintError::Overflow);
        }

        let bits = (byte & 0x7F) as u64;
        // The tenth byte may only carry the single remaining bit
        if index == MAX_VARINT_LEN - 1 && bits > 1 {
            return Err(VarintError::Overflow);
        }
        value |= bits << (7 * index);

        if (byte & 0x80) == 0 {
            return Ok((value, index + 1));
        }
    }

    Err(VarintError::Truncated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_varint_encoding() {
        let test_cases = vec![
            (0u64, vec![0x00]),
            (1u64, vec![0x01]),
            (127u64, vec![0x7F]),
            (128u64, vec![0x80, 0x01]),
            (300u64, vec![0xAC, 0x02]),
            (16384u64, vec![0x80, 0x80, 0x01]),
        ];

        for (value, expected) in test_cases {
            let encoded = encode_varint(value);
            assert_eq!(encoded, expected, "Encoding failed for value {}", value);

            let (decoded, consumed) = decode_varint(&encoded).expect("Decoding failed");
            assert_eq!(decoded, value, "Decoding failed for value {}", value);
            assert_eq!(consumed, encoded.len(), "Wrong consumed bytes for value {}", value);
        }
    }

    #[test]
    fn test_trailing_bytes_are_not_consumed() {
        assert_eq!(decode_varint(&[0xAC, 0x02, 0xFF, 0xFF]), Ok((300, 2)));
    }

    #[test]
    fn test_truncated() {
        assert_eq!(decode_varint(&[]), Err(VarintError::Truncated));
        assert_eq!(decode_varint(&[0x80]), Err(VarintError::Truncated));
        assert_eq!(decode_varint(&[0xFF, 0xFF, 0xFF]), Err(VarintError::Truncated));
    }

    #[test]
    fn test_overflow() {
        assert_eq!(decode_varint(&[0xFF; 11]), Err(VarintError::Overflow));

        let mut ten = vec![0xFF; 9];
        ten.push(0x02);
        assert_eq!(decode_varint(&ten), Err(VarintError::Overflow));
    }

    #[test]
    fn test_max_value() {
        let encoded = encode_varint(u64::MAX);
        assert_eq!(encoded.len(), MAX_VARINT_LEN);
        assert_eq!(decode_varint(&encoded), Ok((u64::MAX, MAX_VARINT_LEN)));
    }

    proptest! {
        #[test]
        fn agrees_with_prost(value in any::<u64>()) {
            let mut expected = Vec::new();
            prost::encoding::encode_varint(value, &mut expected);
            prop_assert_eq!(encode_varint(value), expected.clone());
            prop_assert_eq!(decode_varint(&expected), Ok((value, expected.len())));
        }
    }
}
