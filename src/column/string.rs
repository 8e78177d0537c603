//! Variable-length `String` and fixed-width `FixedString(N)` columns.
//!
//! Both are byte strings on the wire; values decode to `Value::String` when
//! the bytes are UTF-8 and to `Value::Bytes` otherwise.

use std::io::Read;

use super::{mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::{ScalarKind, TypeDescriptor};
use crate::utils::{checked_len, read_bytes};
use crate::value::Value;
use crate::wire;

//==================================================================================
// 1. String
//==================================================================================

#[derive(Debug)]
pub struct StringColumn {
    descriptor: TypeDescriptor,
    data: Vec<u8>,
    /// End offset of each row within `data`.
    offsets: Vec<usize>,
}

impl StringColumn {
    pub fn new() -> Self {
        Self {
            descriptor: TypeDescriptor::Scalar(ScalarKind::String),
            data: Vec::new(),
            offsets: Vec::new(),
        }
    }

    fn bounds(&self, row: usize) -> (usize, usize) {
        let start = if row == 0 { 0 } else { self.offsets[row - 1] };
        (start, self.offsets[row])
    }

    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.offsets.push(self.data.len());
    }

    pub(crate) fn row_bytes(&self, row: usize) -> &[u8] {
        let (start, end) = self.bounds(row);
        &self.data[start..end]
    }
}

impl ColumnCodec for StringColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.offsets.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        match value {
            Value::Null => Err(reject_null(&self.descriptor)),
            other => {
                let bytes = other
                    .as_text_bytes()
                    .ok_or_else(|| mismatch(&self.descriptor, other, "expected a string value"))?;
                self.push_bytes(bytes);
                Ok(())
            }
        }
    }

    fn append_default(&mut self) {
        self.offsets.push(self.data.len());
    }

    fn value(&self, row: usize) -> Value {
        Value::from_text_bytes(self.row_bytes(row).to_vec())
    }

    fn truncate(&mut self, rows: usize) {
        if rows >= self.offsets.len() {
            return;
        }
        self.offsets.truncate(rows);
        let end = self.offsets.last().copied().unwrap_or(0);
        self.data.truncate(end);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        for row in 0..self.offsets.len() {
            wire::write_string(buf, self.row_bytes(row));
        }
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        for _ in 0..rows {
            let bytes = wire::read_string_bytes(reader)?;
            self.push_bytes(&bytes);
        }
        Ok(())
    }
}

//==================================================================================
// 2. FixedString
//==================================================================================

#[derive(Debug)]
pub struct FixedStringColumn {
    descriptor: TypeDescriptor,
    width: usize,
    data: Vec<u8>,
}

impl FixedStringColumn {
    pub fn new(width: usize) -> Self {
        Self {
            descriptor: TypeDescriptor::FixedString(width),
            width,
            data: Vec::new(),
        }
    }

    pub(crate) fn row_bytes(&self, row: usize) -> &[u8] {
        let start = row * self.width;
        &self.data[start..start + self.width]
    }
}

impl ColumnCodec for FixedStringColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.data.len() / self.width
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let bytes = match value {
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => other
                .as_text_bytes()
                .ok_or_else(|| mismatch(&self.descriptor, other, "expected a string value"))?,
        };
        if bytes.len() > self.width {
            return Err(mismatch(
                &self.descriptor,
                value,
                format!("{} bytes do not fit in {} bytes", bytes.len(), self.width),
            ));
        }
        self.data.extend_from_slice(bytes);
        self.data.resize(self.data.len() + self.width - bytes.len(), 0);
        Ok(())
    }

    fn append_default(&mut self) {
        self.data.resize(self.data.len() + self.width, 0);
    }

    /// Returns all `width` bytes, zero padding included.
    fn value(&self, row: usize) -> Value {
        Value::from_text_bytes(self.row_bytes(row).to_vec())
    }

    fn truncate(&mut self, rows: usize) {
        self.data.truncate(rows * self.width);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.data);
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let bytes = read_bytes(reader, checked_len(rows, self.width)?)?;
        self.data.extend_from_slice(&bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_string_wire_layout() {
        let mut col = StringColumn::new();
        col.append(&Value::String("ab".into())).unwrap();
        col.append_default();
        col.append(&Value::Bytes(vec![0xff])).unwrap();
        let mut buf = Vec::new();
        col.write_data(&mut buf);
        assert_eq!(buf, vec![2, b'a', b'b', 0, 1, 0xff]);

        let mut decoded = StringColumn::new();
        decoded.read_data(&mut Cursor::new(buf), 3).unwrap();
        assert_eq!(decoded.value(0), Value::String("ab".into()));
        assert_eq!(decoded.value(1), Value::String(String::new()));
        assert_eq!(decoded.value(2), Value::Bytes(vec![0xff]));
    }

    #[test]
    fn test_string_truncate() {
        let mut col = StringColumn::new();
        for word in ["one", "two", "three"] {
            col.append(&Value::String(word.into())).unwrap();
        }
        col.truncate(1);
        col.append(&Value::String("x".into())).unwrap();
        assert_eq!(col.value(1), Value::String("x".into()));
        assert_eq!(col.rows(), 2);
    }

    #[test]
    fn test_fixed_string_padding_and_overflow() {
        let mut col = FixedStringColumn::new(3);
        col.append(&Value::String("ab".into())).unwrap();
        assert_eq!(col.value(0), Value::String("ab\0".into()));
        let err = col.append(&Value::String("abcd".into())).unwrap_err();
        assert!(err.reason.contains("do not fit"));
        assert!(col.append(&Value::Int32(1)).is_err());
        assert_eq!(col.rows(), 1);
    }
}
