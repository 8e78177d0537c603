//! Geo aliases (`Point`, `Ring`, `Polygon`, ...) reuse the codec of their
//! structural shape but keep their own name in block headers.

use std::io::Read;

use super::ColumnCodec;
use crate::error::{ChwireError, ConversionError};
use crate::types::TypeDescriptor;
use crate::value::Value;

#[derive(Debug)]
pub struct GeoColumn {
    descriptor: TypeDescriptor,
    storage: Box<dyn ColumnCodec>,
}

impl GeoColumn {
    pub fn new(descriptor: TypeDescriptor, storage: Box<dyn ColumnCodec>) -> Self {
        Self {
            descriptor,
            storage,
        }
    }
}

impl ColumnCodec for GeoColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.storage.rows()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        self.storage
            .append(value)
            .map_err(|e| ConversionError { declared_type: self.descriptor.to_string(), ..e })
    }

    fn append_default(&mut self) {
        self.storage.append_default();
    }

    fn value(&self, row: usize) -> Value {
        self.storage.value(row)
    }

    fn truncate(&mut self, rows: usize) {
        self.storage.truncate(rows);
    }

    fn write_prefix(&self, buf: &mut Vec<u8>) {
        self.storage.write_prefix(buf);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        self.storage.write_data(buf);
    }

    fn read_prefix(&mut self, reader: &mut dyn Read) -> Result<(), ChwireError> {
        self.storage.read_prefix(reader)
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        self.storage.read_data(reader, rows)
    }
}
