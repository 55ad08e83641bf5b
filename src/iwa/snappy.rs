//! Snappy decompression for iWork IWA files
//!
//! iWork uses a custom Snappy framing format that differs from the standard:
//! - No stream identifier chunk
//! - No CRC-32C checksums
//! - Custom chunk header format (4 bytes: type + 24-bit length)

use std::io::Read;

use snap::raw::{Decoder, decompress_len};
use tracing::trace;

use crate::iwa::{Error, Result};

/// Size of the chunk header: one type byte plus a 24-bit little-endian length
pub const CHUNK_HEADER_LEN: usize = 4;

/// The only chunk type iWork writes
pub const COMPRESSED_CHUNK: u8 = 0;

/// Upper bound on Snappy's output-to-input ratio. The densest element is a
/// 3-byte copy producing 64 bytes.
pub const MAX_EXPANSION: usize = 32;

/// Custom Snappy stream decompressor for iWork IWA files
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SnappyStream {
    decompressed: Vec<u8>,
}

impl SnappyStream {
    /// Decompress a complete IWA entry.
    ///
    /// The entry is a sequence of chunks:
    /// - 4-byte header: [chunk_type, length_byte1, length_byte2, length_byte3]
    /// - chunk_type must be 0 (compressed block)
    /// - length is a 24-bit little-endian integer, excluding the header
    /// - followed by exactly `length` bytes of a raw Snappy block
    ///
    /// Every block is decoded independently and appended in order. Any bad
    /// header, overrun or corrupt block fails the whole entry, as does a block
    /// declaring more than [`MAX_EXPANSION`] times its own length.
    pub fn decompress(data: &[u8]) -> Result<Self> {
        let mut decompressed = Vec::new();
        let mut decoder = Decoder::new();
        let mut offset = 0;

        while offset < data.len() {
            let available = data.len() - offset;
            if available < CHUNK_HEADER_LEN {
                return Err(Error::TruncatedChunk {
                    offset,
                    needed: CHUNK_HEADER_LEN,
                    available,
                });
            }

            let header = &data[offset..offset + CHUNK_HEADER_LEN];
            let chunk_type = header[0];
            if chunk_type != COMPRESSED_CHUNK {
                return Err(Error::InvalidChunkType { offset, chunk_type });
            }

            let length = u32::from_le_bytes([header[1], header[2], header[3], 0]) as usize;
            let body_start = offset + CHUNK_HEADER_LEN;
            let available = data.len() - body_start;
            if length > available {
                return Err(Error::TruncatedChunk {
                    offset,
                    needed: length,
                    available,
                });
            }

            let block = &data[body_start..body_start + length];
            let snappy_err = |source| Error::Snappy { offset, source };

            // Decode straight into the tail of the output buffer
            let block_len = decompress_len(block).map_err(snappy_err)?;
            let limit = length.saturating_mul(MAX_EXPANSION);
            if block_len > limit {
                return Err(Error::OversizedChunk {
                    offset,
                    declared: block_len,
                    limit,
                });
            }
            let start = decompressed.len();
            decompressed.resize(start + block_len, 0);
            let written = decoder
                .decompress(block, &mut decompressed[start..])
                .map_err(snappy_err)?;
            decompressed.truncate(start + written);

            trace!(offset, compressed = length, decompressed = written, "decoded chunk");
            offset = body_start + length;
        }

        Ok(SnappyStream { decompressed })
    }

    /// Read an entry to the end and decompress it
    pub fn decompress_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::decompress(&data)
    }

    /// Get the decompressed data as a slice
    pub fn data(&self) -> &[u8] {
        &self.decompressed
    }

    /// Consume self and return the decompressed data
    pub fn into_data(self) -> Vec<u8> {
        self.decompressed
    }

    /// Number of decompressed bytes
    pub fn len(&self) -> usize {
        self.decompressed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decompressed.is_empty()
    }
}

impl AsRef<[u8]> for SnappyStream {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iwa::test_support::frame;
    use proptest::prelude::*;
    use std::io::Cursor;

    #[test]
    fn test_empty_stream() {
        let stream = SnappyStream::decompress(&[]).unwrap();
        assert!(stream.is_empty());
    }

    #[test]
    fn test_single_chunk() {
        let payload = b"hello hello hello hello iwork".to_vec();
        let framed = frame(&[payload.as_slice()]);
        let stream = SnappyStream::decompress(&framed).unwrap();
        assert_eq!(stream.data(), payload.as_slice());
    }

    #[test]
    fn test_chunks_are_concatenated_in_order() {
        let framed = frame(&[b"first-", b"second-", b"third"]);
        let stream = SnappyStream::decompress(&framed).unwrap();
        assert_eq!(stream.into_data(), b"first-second-third".to_vec());
    }

    #[test]
    fn test_invalid_chunk_type() {
        let mut framed = frame(&[b"abc"]);
        framed[0] = 1;
        match SnappyStream::decompress(&framed) {
            Err(Error::InvalidChunkType { offset, chunk_type }) => {
                assert_eq!(offset, 0);
                assert_eq!(chunk_type, 1);
            },
            other => panic!("expected InvalidChunkType, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_chunk_type_in_second_chunk() {
        let first = frame(&[b"abc"]);
        let mut framed = first.clone();
        framed.extend(frame(&[b"def"]));
        framed[first.len()] = 0xff;
        assert!(matches!(
            SnappyStream::decompress(&framed),
            Err(Error::InvalidChunkType { offset, chunk_type: 0xff }) if offset == first.len()
        ));
    }

    #[test]
    fn test_length_past_end() {
        let mut framed = frame(&[b"some bytes to compress"]);
        framed.truncate(framed.len() - 1);
        assert!(matches!(
            SnappyStream::decompress(&framed),
            Err(Error::TruncatedChunk { offset: 0, .. })
        ));
    }

    #[test]
    fn test_partial_header() {
        let mut framed = frame(&[b"xyz"]);
        framed.extend([0, 1]);
        assert!(matches!(
            SnappyStream::decompress(&framed),
            Err(Error::TruncatedChunk { needed: CHUNK_HEADER_LEN, available: 2, .. })
        ));
    }

    #[test]
    fn test_corrupt_block() {
        // Declares 100 uncompressed bytes but carries a literal tag running off the end
        let block = [100u8, 0xfc, 0xff];
        let mut framed = vec![0, block.len() as u8, 0, 0];
        framed.extend(block);
        assert!(matches!(
            SnappyStream::decompress(&framed),
            Err(Error::Snappy { offset: 0, .. })
        ));
    }

    #[test]
    fn test_empty_block_is_rejected() {
        assert!(matches!(
            SnappyStream::decompress(&[0, 0, 0, 0]),
            Err(Error::Snappy { .. })
        ));
    }

    #[test]
    fn test_oversized_declared_length() {
        // Five-byte block claiming a 1 GiB output
        let framed = [0, 5, 0, 0, 0x80, 0x80, 0x80, 0x80, 0x04];
        match SnappyStream::decompress(&framed) {
            Err(Error::OversizedChunk { offset, declared, limit }) => {
                assert_eq!(offset, 0);
                assert_eq!(declared, 1 << 30);
                assert_eq!(limit, 5 * MAX_EXPANSION);
            },
            other => panic!("expected OversizedChunk, got {:?}", other),
        }
    }

    #[test]
    fn test_oversized_second_chunk() {
        let mut framed = frame(&[b"fine"]);
        let second = framed.len();
        framed.extend([0, 5, 0, 0, 0xff, 0xff, 0xff, 0xff, 0x0f]);
        assert!(matches!(
            SnappyStream::decompress(&framed),
            Err(Error::OversizedChunk { offset, .. }) if offset == second
        ));
    }

    #[test]
    fn test_highly_compressible_block_fits_limit() {
        let payload = vec![0u8; 64 * 1024];
        let framed = frame(&[payload.as_slice()]);
        let stream = SnappyStream::decompress(&framed).unwrap();
        assert_eq!(stream.len(), payload.len());
    }

    #[test]
    fn test_decompress_reader() {
        let framed = frame(&[b"from a reader"]);
        let stream = SnappyStream::decompress_reader(&mut Cursor::new(framed)).unwrap();
        assert_eq!(stream.as_ref(), b"from a reader");
    }

    proptest! {
        #[test]
        fn arbitrary_input_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = SnappyStream::decompress(&data);
        }

        #[test]
        fn framed_payloads_decode_back(chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 1..256), 0..6)
        ) {
            let refs: Vec<&[u8]> = chunks.iter().map(Vec::as_slice).collect();
            let stream = SnappyStream::decompress(&frame(&refs)).unwrap();
            prop_assert_eq!(stream.into_data(), chunks.concat());
        }
    }
}
