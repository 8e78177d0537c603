//! `Array(T)`: cumulative u64 end offsets, then the flattened nested column.

use std::io::Read;

use super::{corrupt, mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::TypeDescriptor;
use crate::utils::{read_typed_vec, typed_slice_to_bytes, MAX_READ_ALLOCATION};
use crate::value::Value;

/// Reads `rows` offsets and checks they never decrease. Returns them relative
/// to the block, together with the number of nested rows they cover.
pub(crate) fn read_offsets(
    reader: &mut dyn Read,
    rows: usize,
) -> Result<(Vec<u64>, usize), ChwireError> {
    let offsets = read_typed_vec::<u64>(reader, rows)?;
    let mut previous = 0u64;
    for (row, offset) in offsets.iter().enumerate() {
        if *offset < previous {
            return Err(corrupt(format!(
                "offset {} at row {} is smaller than the previous offset {}",
                offset, row, previous
            )));
        }
        previous = *offset;
    }
    let total = usize::try_from(previous)
        .ok()
        .filter(|t| *t <= MAX_READ_ALLOCATION)
        .ok_or_else(|| corrupt(format!("{} nested values exceed the read limit", previous)))?;
    Ok((offsets, total))
}

#[derive(Debug)]
pub struct ArrayColumn {
    descriptor: TypeDescriptor,
    offsets: Vec<u64>,
    inner: Box<dyn ColumnCodec>,
}

impl ArrayColumn {
    pub fn new(descriptor: TypeDescriptor, inner: Box<dyn ColumnCodec>) -> Self {
        Self {
            descriptor,
            offsets: Vec::new(),
            inner,
        }
    }

    fn end(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }
}

impl ColumnCodec for ArrayColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.offsets.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let items = match value {
            Value::Array(items) => items,
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => return Err(mismatch(&self.descriptor, other, "expected an array value")),
        };
        let start = self.inner.rows();
        for item in items {
            if let Err(e) = self.inner.append(item) {
                self.inner.truncate(start);
                return Err(e);
            }
        }
        self.offsets.push(self.end() + items.len() as u64);
        Ok(())
    }

    fn append_default(&mut self) {
        self.offsets.push(self.end());
    }

    fn value(&self, row: usize) -> Value {
        let start = if row == 0 { 0 } else { self.offsets[row - 1] as usize };
        let end = self.offsets[row] as usize;
        Value::Array((start..end).map(|i| self.inner.value(i)).collect())
    }

    fn truncate(&mut self, rows: usize) {
        if rows >= self.offsets.len() {
            return;
        }
        self.offsets.truncate(rows);
        self.inner.truncate(self.end() as usize);
    }

    fn write_prefix(&self, buf: &mut Vec<u8>) {
        self.inner.write_prefix(buf);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(typed_slice_to_bytes(&self.offsets));
        self.inner.write_data(buf);
    }

    fn read_prefix(&mut self, reader: &mut dyn Read) -> Result<(), ChwireError> {
        self.inner.read_prefix(reader)
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let (offsets, total) = read_offsets(reader, rows)?;
        self.inner.read_data(reader, total)?;
        let base = self.end();
        self.offsets.extend(offsets.into_iter().map(|o| base + o));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{new_column, CodecOptions};
    use crate::types::parse_type;
    use std::io::Cursor;

    fn column(signature: &str) -> Box<dyn ColumnCodec> {
        new_column(&parse_type(signature).unwrap(), &CodecOptions::default()).unwrap()
    }

    #[test]
    fn test_offsets_are_cumulative() {
        let mut col = column("Array(UInt8)");
        col.append(&Value::Array(vec![Value::UInt8(1), Value::UInt8(2)])).unwrap();
        col.append(&Value::Array(vec![])).unwrap();
        col.append(&Value::Array(vec![Value::UInt8(3)])).unwrap();
        let mut buf = Vec::new();
        col.write_data(&mut buf);
        let mut expected = Vec::new();
        for o in [2u64, 2, 3] {
            expected.extend_from_slice(&o.to_le_bytes());
        }
        expected.extend_from_slice(&[1, 2, 3]);
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_failed_element_rolls_back() {
        let mut col = column("Array(UInt8)");
        let bad = Value::Array(vec![Value::UInt8(1), Value::String("x".into())]);
        assert!(col.append(&bad).is_err());
        col.append(&Value::Array(vec![Value::UInt8(9)])).unwrap();
        assert_eq!(col.rows(), 1);
        assert_eq!(col.value(0), Value::Array(vec![Value::UInt8(9)]));
    }

    #[test]
    fn test_scalar_for_array_is_rejected() {
        let mut col = column("Array(Array(String))");
        let err = col
            .append(&Value::Array(vec![Value::String("flat".into())]))
            .unwrap_err();
        assert_eq!(err.value_type, "String");
    }

    #[test]
    fn test_decreasing_offsets_are_corrupt() {
        let mut buf = Vec::new();
        for o in [2u64, 1] {
            buf.extend_from_slice(&o.to_le_bytes());
        }
        let mut col = column("Array(UInt8)");
        let result = col.read_data(&mut Cursor::new(buf), 2);
        assert!(matches!(result, Err(ChwireError::CorruptBlock { .. })));
    }
}
