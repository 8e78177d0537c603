//! This module provides a set of shared, low-level utility functions used
//! throughout the chwire core.
//!
//! Its primary responsibilities include:
//! 1.  Providing safe, validated conversions between raw byte slices and typed slices.
//! 2.  Bounding the allocations a malformed stream can request.

use std::io::Read;

use crate::error::ChwireError;

/// The largest single allocation a decoder will make on the say-so of the stream.
pub const MAX_READ_ALLOCATION: usize = 1 << 30;

/// Converts a slice of plain-old-data values into their wire bytes.
///
/// The native protocol is little-endian; `lib.rs` refuses to build on
/// big-endian targets, so the in-memory layout is the wire layout.
pub fn typed_slice_to_bytes<T: bytemuck::Pod>(data: &[T]) -> &[u8] {
    bytemuck::cast_slice(data)
}

/// Copies wire bytes into an owned vector of `T`, regardless of alignment.
pub fn bytes_to_typed_vec<T: bytemuck::Pod>(bytes: &[u8]) -> Result<Vec<T>, ChwireError> {
    let width = std::mem::size_of::<T>();
    if width == 0 || bytes.len() % width != 0 {
        return Err(ChwireError::Protocol(format!(
            "buffer of {} bytes is not a multiple of {}",
            bytes.len(),
            width
        )));
    }
    Ok(bytemuck::pod_collect_to_vec(bytes))
}

/// Reads exactly `count` values of `T` from the stream.
pub fn read_typed_vec<T: bytemuck::Pod>(
    reader: &mut dyn Read,
    count: usize,
) -> Result<Vec<T>, ChwireError> {
    let bytes = read_bytes(reader, checked_len(count, std::mem::size_of::<T>())?)?;
    bytes_to_typed_vec(&bytes)
}

/// Reads exactly `len` raw bytes from the stream.
pub fn read_bytes(reader: &mut dyn Read, len: usize) -> Result<Vec<u8>, ChwireError> {
    if len > MAX_READ_ALLOCATION {
        return Err(ChwireError::Protocol(format!(
            "refusing to allocate {} bytes for a single read",
            len
        )));
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// `count * width`, rejecting overflow and oversized requests.
pub fn checked_len(count: usize, width: usize) -> Result<usize, ChwireError> {
    count
        .checked_mul(width)
        .filter(|len| *len <= MAX_READ_ALLOCATION)
        .ok_or_else(|| {
            ChwireError::Protocol(format!(
                "{} values of {} bytes exceed the read allocation limit",
                count, width
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_typed_roundtrip_is_little_endian() {
        let original: Vec<u16> = vec![258, 1];
        let bytes = typed_slice_to_bytes(&original);
        assert_eq!(bytes, &[0x02, 0x01, 0x01, 0x00]);
        assert_eq!(bytes_to_typed_vec::<u16>(bytes).unwrap(), original);
    }

    #[test]
    fn test_unaligned_source_is_accepted() {
        let bytes = [0u8, 1, 0, 0, 0];
        // Offset by one so the slice is not 4-byte aligned.
        let values = bytes_to_typed_vec::<u32>(&bytes[1..]).unwrap();
        assert_eq!(values, vec![1]);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let result = bytes_to_typed_vec::<i32>(&[0, 1, 2]);
        assert!(matches!(result, Err(ChwireError::Protocol(_))));
    }

    #[test]
    fn test_read_typed_vec_short_stream() {
        let mut cursor = Cursor::new(vec![1u8, 0, 0]);
        let result = read_typed_vec::<u32>(&mut cursor, 1);
        assert!(matches!(result, Err(ChwireError::Transport(_))));
    }

    #[test]
    fn test_oversized_request_is_refused() {
        assert!(checked_len(usize::MAX / 2, 4).is_err());
    }
}
