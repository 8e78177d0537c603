//! Whole-body content-encoding kernels for the HTTP transport variant.
//!
//! Unlike native frames these operate on an entire request/response body and
//! carry no checksum of their own.

use std::io::{Read, Write};

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use crate::config::HttpEncoding;
use crate::error::ChwireError;

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_WINDOW: u32 = 22;

fn compression_error(encoding: HttpEncoding, err: std::io::Error) -> ChwireError {
    ChwireError::Compression(format!("{}: {}", encoding.header_value(), err))
}

/// Encodes a complete body with the given content-encoding.
pub fn encode(body: &[u8], encoding: HttpEncoding) -> Result<Vec<u8>, ChwireError> {
    let wrap = |e| compression_error(encoding, e);
    match encoding {
        HttpEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body).map_err(wrap)?;
            encoder.finish().map_err(wrap)
        }
        // HTTP "deflate" is the zlib container, not a raw deflate stream.
        HttpEncoding::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body).map_err(wrap)?;
            encoder.finish().map_err(wrap)
        }
        HttpEncoding::Brotli => {
            let mut encoder = brotli::CompressorWriter::new(
                Vec::new(),
                BROTLI_BUFFER_SIZE,
                BROTLI_QUALITY,
                BROTLI_WINDOW,
            );
            encoder.write_all(body).map_err(wrap)?;
            encoder.flush().map_err(wrap)?;
            Ok(encoder.into_inner())
        }
    }
}

/// Decodes a complete body. A malformed stream is reported as `CorruptFrame`.
pub fn decode(body: &[u8], encoding: HttpEncoding) -> Result<Vec<u8>, ChwireError> {
    let mut output = Vec::new();
    let result = match encoding {
        HttpEncoding::Gzip => GzDecoder::new(body).read_to_end(&mut output),
        HttpEncoding::Deflate => ZlibDecoder::new(body).read_to_end(&mut output),
        HttpEncoding::Brotli => {
            brotli::Decompressor::new(body, BROTLI_BUFFER_SIZE).read_to_end(&mut output)
        }
    };
    result.map_err(|e| ChwireError::CorruptFrame(format!("{}: {}", encoding.header_value(), e)))?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_encodings_roundtrip() {
        let body = b"\x01\x02\x02id\x06UInt64".repeat(100);
        for encoding in [HttpEncoding::Gzip, HttpEncoding::Deflate, HttpEncoding::Brotli] {
            let encoded = encode(&body, encoding).unwrap();
            assert!(encoded.len() < body.len(), "{:?} did not shrink", encoding);
            assert_eq!(decode(&encoded, encoding).unwrap(), body);
        }
    }

    #[test]
    fn test_gzip_magic_bytes() {
        let encoded = encode(b"x", HttpEncoding::Gzip).unwrap();
        assert_eq!(&encoded[..2], &[0x1f, 0x8b]);
    }

    #[test]
    fn test_garbage_gzip_is_rejected() {
        let result = decode(b"definitely not gzip", HttpEncoding::Gzip);
        assert!(matches!(result, Err(ChwireError::CorruptFrame(_))));
    }
}
