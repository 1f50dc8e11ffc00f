//! zlib compression of frame payloads.
//!
//! The daemon compresses every serialized message with zlib (deflate plus the
//! two-byte zlib header and Adler-32 trailer) before framing it.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::CodecError;

/// Compresses `bytes` with zlib at the default level.
///
/// # Errors
///
/// Returns [`CodecError::Compress`] if the encoder fails, which only happens
/// if writing to an in-memory buffer fails.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(bytes.len() / 2 + 16), Compression::default());
    encoder.write_all(bytes).map_err(CodecError::Compress)?;
    encoder.finish().map_err(CodecError::Compress)
}

/// Decompresses a complete zlib stream.
///
/// # Errors
///
/// Returns [`CodecError::Decompress`] for corrupt or truncated input.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut decoder = ZlibDecoder::new(bytes);
    let mut out = Vec::with_capacity(bytes.len() * 4);
    decoder.read_to_end(&mut out).map_err(CodecError::Decompress)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_then_decompress_restores_input() {
        let inputs: [&[u8]; 4] = [b"", b"a", b"daemon.info", &[0u8; 4096]];
        for input in inputs {
            let packed = compress(input).expect("compress");
            assert_eq!(decompress(&packed).expect("decompress"), input);
        }
    }

    #[test]
    fn test_compressed_output_has_zlib_header() {
        let packed = compress(b"hello").unwrap();
        // 0x78 = deflate with a 32K window; 0x9C = default level check bits.
        assert_eq!(&packed[..2], &[0x78, 0x9C]);
    }

    #[test]
    fn test_decompress_garbage_is_error() {
        let result = decompress(b"definitely not zlib");
        assert!(matches!(result, Err(CodecError::Decompress(_))));
    }

    #[test]
    fn test_decompress_truncated_stream_is_error() {
        // Arrange
        let packed = compress(&[7u8; 1000]).unwrap();

        // Act
        let result = decompress(&packed[..packed.len() / 2]);

        // Assert
        assert!(result.is_err());
    }
}
