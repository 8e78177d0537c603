//! This module contains the pure, stateless kernels for LEB128
//! (Little-Endian Base 128) variable-length integer encoding and decoding.
//!
//! The native protocol uses unsigned LEB128 for packet ids, string lengths,
//! block field numbers and column/row counts. It is fully panic-free.

use std::io::Read;

use num_traits::{PrimInt, Unsigned};

use crate::error::ChwireError;

/// The longest encoding of a `u64` is ten bytes.
const MAX_VARINT_LEN: usize = 10;

//==================================================================================
// 1. Single-Value Operations
//==================================================================================

/// Encodes a single unsigned integer into a LEB128 byte sequence, appending to `buffer`.
pub fn encode_one<T>(value: T, buffer: &mut Vec<u8>)
where
    T: PrimInt + Unsigned,
{
    let mut current = value.to_u128().unwrap_or(0);
    loop {
        let byte = (current & 0x7F) as u8;
        current >>= 7;
        if current == 0 {
            buffer.push(byte);
            break;
        }
        buffer.push(byte | 0x80);
    }
}

/// Decodes a single `u64` from a byte stream, one byte at a time.
pub fn decode_one(reader: &mut dyn Read) -> Result<u64, ChwireError> {
    let mut result: u64 = 0;
    let mut byte = [0u8; 1];
    for index in 0..MAX_VARINT_LEN {
        reader.read_exact(&mut byte)?;
        let payload = (byte[0] & 0x7F) as u64;
        let shift = (index * 7) as u32;

        // The tenth byte may only carry the single top bit of a u64.
        if index == MAX_VARINT_LEN - 1 && payload > 1 {
            return Err(ChwireError::Protocol(
                "varint overflows 64 bits".to_string(),
            ));
        }
        result |= payload << shift;

        if byte[0] & 0x80 == 0 {
            return Ok(result);
        }
    }
    Err(ChwireError::Protocol(format!(
        "varint longer than {} bytes",
        MAX_VARINT_LEN
    )))
}

/// Decodes a varint that is used as a length or count, bounded by `limit`.
pub fn decode_len(reader: &mut dyn Read, limit: usize) -> Result<usize, ChwireError> {
    let value = decode_one(reader)?;
    usize::try_from(value)
        .ok()
        .filter(|len| *len <= limit)
        .ok_or_else(|| {
            ChwireError::Protocol(format!("length {} exceeds the limit of {}", value, limit))
        })
}

//==================================================================================
// 2. Unit Tests
//==================================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_leb128_roundtrip_u64() {
        let original: Vec<u64> = vec![0, 127, 128, 300, 16_384, u32::MAX as u64, u64::MAX];
        let mut encoded = Vec::new();
        for value in &original {
            encode_one(*value, &mut encoded);
        }
        let mut cursor = Cursor::new(&encoded[..]);
        let decoded: Vec<u64> = original.iter().map(|_| decode_one(&mut cursor).unwrap()).collect();
        assert_eq!(decoded, original);
        assert_eq!(cursor.position() as usize, encoded.len());
    }

    #[test]
    fn test_known_encodings() {
        let mut buf = Vec::new();
        encode_one(300u32, &mut buf);
        assert_eq!(buf, vec![0xAC, 0x02]);
        buf.clear();
        encode_one(u64::MAX, &mut buf);
        assert_eq!(buf.len(), 10);
        assert_eq!(buf[9], 0x01);
    }

    #[test]
    fn test_decode_overflow_is_rejected() {
        let bytes = [0xFFu8, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
        let result = decode_one(&mut Cursor::new(&bytes[..]));
        assert!(matches!(result, Err(ChwireError::Protocol(_))));
    }

    #[test]
    fn test_decode_truncated_stream() {
        let result = decode_one(&mut Cursor::new(&[0x80u8][..]));
        assert!(matches!(result, Err(ChwireError::Transport(_))));
    }

    #[test]
    fn test_decode_len_limit() {
        let mut buf = Vec::new();
        encode_one(1_000u64, &mut buf);
        assert!(decode_len(&mut Cursor::new(&buf[..]), 999).is_err());
        assert_eq!(decode_len(&mut Cursor::new(&buf[..]), 1_000).unwrap(), 1_000);
    }
}
