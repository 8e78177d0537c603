//! Primitive field encoding shared by the block and packet codecs: varints,
//! length-prefixed strings and little-endian fixed-width integers.

use std::io::Read;

use crate::error::ChwireError;
use crate::kernels::leb128;
use crate::utils::{read_bytes, MAX_READ_ALLOCATION};

//==================================================================================
// 1. Writers
//==================================================================================

pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    leb128::encode_one(value, buf);
}

/// A varint length followed by the raw bytes.
pub fn write_string(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

pub fn write_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

pub fn write_bool(buf: &mut Vec<u8>, value: bool) {
    buf.push(value as u8);
}

pub fn write_i32(buf: &mut Vec<u8>, value: i32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub fn write_u64(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

//==================================================================================
// 2. Readers
//==================================================================================

pub fn read_varint(reader: &mut dyn Read) -> Result<u64, ChwireError> {
    leb128::decode_one(reader)
}

/// Reads a varint and checks it against the allocation limit.
pub fn read_len(reader: &mut dyn Read) -> Result<usize, ChwireError> {
    leb128::decode_len(reader, MAX_READ_ALLOCATION)
}

pub fn read_string_bytes(reader: &mut dyn Read) -> Result<Vec<u8>, ChwireError> {
    let len = read_len(reader)?;
    read_bytes(reader, len)
}

/// Reads a string that the protocol guarantees to be UTF-8 (names, types, messages).
pub fn read_string(reader: &mut dyn Read) -> Result<String, ChwireError> {
    let bytes = read_string_bytes(reader)?;
    String::from_utf8(bytes)
        .map_err(|e| ChwireError::Protocol(format!("string field is not UTF-8: {}", e)))
}

pub fn read_u8(reader: &mut dyn Read) -> Result<u8, ChwireError> {
    let mut byte = [0u8; 1];
    reader.read_exact(&mut byte)?;
    Ok(byte[0])
}

pub fn read_bool(reader: &mut dyn Read) -> Result<bool, ChwireError> {
    Ok(read_u8(reader)? != 0)
}

pub fn read_i32(reader: &mut dyn Read) -> Result<i32, ChwireError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(i32::from_le_bytes(bytes))
}

pub fn read_u64(reader: &mut dyn Read) -> Result<u64, ChwireError> {
    let mut bytes = [0u8; 8];
    reader.read_exact(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_string_roundtrip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "Nullable(String)".as_bytes());
        write_string(&mut buf, b"");
        assert_eq!(buf[0], 16);
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_string(&mut cursor).unwrap(), "Nullable(String)");
        assert_eq!(read_string(&mut cursor).unwrap(), "");
    }

    #[test]
    fn test_fixed_width_little_endian() {
        let mut buf = Vec::new();
        write_i32(&mut buf, -1);
        write_u64(&mut buf, 258);
        assert_eq!(&buf[..4], &[0xff; 4]);
        assert_eq!(&buf[4..6], &[0x02, 0x01]);
        let mut cursor = Cursor::new(buf);
        assert_eq!(read_i32(&mut cursor).unwrap(), -1);
        assert_eq!(read_u64(&mut cursor).unwrap(), 258);
    }

    #[test]
    fn test_non_utf8_name_is_protocol_error() {
        let mut buf = Vec::new();
        write_string(&mut buf, &[0xff, 0xfe]);
        let result = read_string(&mut Cursor::new(buf));
        assert!(matches!(result, Err(ChwireError::Protocol(_))));
    }
}
