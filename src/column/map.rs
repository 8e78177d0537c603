//! `Map(K, V)`: encoded as `Array(Tuple(K, V))`, i.e. offsets, then all keys,
//! then all values.

use std::io::Read;

use super::array::read_offsets;
use super::{mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::TypeDescriptor;
use crate::utils::typed_slice_to_bytes;
use crate::value::Value;

#[derive(Debug)]
pub struct MapColumn {
    descriptor: TypeDescriptor,
    offsets: Vec<u64>,
    keys: Box<dyn ColumnCodec>,
    values: Box<dyn ColumnCodec>,
}

impl MapColumn {
    pub fn new(
        descriptor: TypeDescriptor,
        keys: Box<dyn ColumnCodec>,
        values: Box<dyn ColumnCodec>,
    ) -> Self {
        Self {
            descriptor,
            offsets: Vec::new(),
            keys,
            values,
        }
    }

    fn end(&self) -> u64 {
        self.offsets.last().copied().unwrap_or(0)
    }

    fn rollback(&mut self, entries: usize) {
        self.keys.truncate(entries);
        self.values.truncate(entries);
    }
}

impl ColumnCodec for MapColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.offsets.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let entries = match value {
            Value::Map(entries) => entries,
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => return Err(mismatch(&self.descriptor, other, "expected a map value")),
        };
        let start = self.end() as usize;
        for (key, val) in entries {
            let result = self.keys.append(key).and_then(|_| self.values.append(val));
            if let Err(e) = result {
                self.rollback(start);
                return Err(e);
            }
        }
        self.offsets.push(self.end() + entries.len() as u64);
        Ok(())
    }

    fn append_default(&mut self) {
        self.offsets.push(self.end());
    }

    fn value(&self, row: usize) -> Value {
        let start = if row == 0 { 0 } else { self.offsets[row - 1] as usize };
        let end = self.offsets[row] as usize;
        Value::Map(
            (start..end)
                .map(|i| (self.keys.value(i), self.values.value(i)))
                .collect(),
        )
    }

    fn truncate(&mut self, rows: usize) {
        if rows >= self.offsets.len() {
            return;
        }
        self.offsets.truncate(rows);
        let end = self.end() as usize;
        self.rollback(end);
    }

    fn write_prefix(&self, buf: &mut Vec<u8>) {
        self.keys.write_prefix(buf);
        self.values.write_prefix(buf);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(typed_slice_to_bytes(&self.offsets));
        self.keys.write_data(buf);
        self.values.write_data(buf);
    }

    fn read_prefix(&mut self, reader: &mut dyn Read) -> Result<(), ChwireError> {
        self.keys.read_prefix(reader)?;
        self.values.read_prefix(reader)
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let (offsets, total) = read_offsets(reader, rows)?;
        self.keys.read_data(reader, total)?;
        self.values.read_data(reader, total)?;
        let base = self.end();
        self.offsets.extend(offsets.into_iter().map(|o| base + o));
        Ok(())
    }
}
