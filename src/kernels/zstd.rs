//! This module contains the pure, stateless kernels for Zstandard compression
//! and decompression of a single frame payload.
//!
//! It is a safe, panic-free wrapper around the `zstd` crate.

use std::io::Write;
use zstd::stream::{Decoder, Encoder};

use crate::error::ChwireError;

//==================================================================================
// 1. Core Logic
//==================================================================================

fn compress_slice(
    input_bytes: &[u8],
    output_buf: &mut Vec<u8>,
    level: i32,
) -> Result<(), ChwireError> {
    let mut encoder =
        Encoder::new(output_buf, level).map_err(|e| ChwireError::Compression(e.to_string()))?;
    encoder
        .write_all(input_bytes)
        .map_err(|e| ChwireError::Compression(e.to_string()))?;

    // `finish` is essential to finalize the Zstd frame.
    encoder
        .finish()
        .map_err(|e| ChwireError::Compression(e.to_string()))?;
    Ok(())
}

fn decompress_slice(
    input_bytes: &[u8],
    output_buf: &mut Vec<u8>,
    expected_len: usize,
) -> Result<(), ChwireError> {
    let decoder = Decoder::new(input_bytes).map_err(|e| ChwireError::CorruptFrame(e.to_string()))?;

    // Read one byte past the declared size so an oversized payload is noticed
    // without decompressing all of it.
    let mut limited = std::io::Read::take(decoder, expected_len as u64 + 1);
    std::io::copy(&mut limited, output_buf)
        .map_err(|e| ChwireError::CorruptFrame(format!("zstd: {}", e)))?;
    Ok(())
}

//==================================================================================
// 2. Public API
//==================================================================================

/// Compresses `input_bytes`, appending the Zstd frame to `output_buf`.
pub fn encode(input_bytes: &[u8], output_buf: &mut Vec<u8>, level: i32) -> Result<(), ChwireError> {
    compress_slice(input_bytes, output_buf, level)
}

/// Decompresses a payload that the frame header says holds `expected_len` bytes.
pub fn decode(input_bytes: &[u8], expected_len: usize) -> Result<Vec<u8>, ChwireError> {
    let mut output = Vec::with_capacity(expected_len);
    decompress_slice(input_bytes, &mut output, expected_len)?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zstd_roundtrip() {
        let original: Vec<u8> = (0..4096u32).map(|i| (i % 17) as u8).collect();
        let mut compressed = Vec::new();
        encode(&original, &mut compressed, 3).unwrap();
        assert!(compressed.len() < original.len());
        assert_eq!(decode(&compressed, original.len()).unwrap(), original);
    }

    #[test]
    fn test_zstd_garbage_is_corrupt_frame() {
        let result = decode(&[1, 2, 3, 4, 5], 10);
        assert!(matches!(result, Err(ChwireError::CorruptFrame(_))));
    }
}
