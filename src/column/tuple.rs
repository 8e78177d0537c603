//! `Tuple(T1, T2, ...)`: each element is an independent column, written one
//! after the other.

use std::io::Read;

use super::{mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::TypeDescriptor;
use crate::value::Value;

#[derive(Debug)]
pub struct TupleColumn {
    descriptor: TypeDescriptor,
    elements: Vec<Box<dyn ColumnCodec>>,
}

impl TupleColumn {
    pub fn new(descriptor: TypeDescriptor, elements: Vec<Box<dyn ColumnCodec>>) -> Self {
        Self {
            descriptor,
            elements,
        }
    }
}

impl ColumnCodec for TupleColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.elements.first().map(|e| e.rows()).unwrap_or(0)
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let items = match value {
            Value::Tuple(items) => items,
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => return Err(mismatch(&self.descriptor, other, "expected a tuple value")),
        };
        if items.len() != self.elements.len() {
            return Err(mismatch(
                &self.descriptor,
                value,
                format!("expected {} elements, got {}", self.elements.len(), items.len()),
            ));
        }
        let rows = self.rows();
        for (index, item) in items.iter().enumerate() {
            if let Err(e) = self.elements[index].append(item) {
                for element in &mut self.elements[..index] {
                    element.truncate(rows);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn append_default(&mut self) {
        for element in &mut self.elements {
            element.append_default();
        }
    }

    fn value(&self, row: usize) -> Value {
        Value::Tuple(self.elements.iter().map(|e| e.value(row)).collect())
    }

    fn truncate(&mut self, rows: usize) {
        for element in &mut self.elements {
            element.truncate(rows);
        }
    }

    fn write_prefix(&self, buf: &mut Vec<u8>) {
        for element in &self.elements {
            element.write_prefix(buf);
        }
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        for element in &self.elements {
            element.write_data(buf);
        }
    }

    fn read_prefix(&mut self, reader: &mut dyn Read) -> Result<(), ChwireError> {
        for element in &mut self.elements {
            element.read_prefix(reader)?;
        }
        Ok(())
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        for element in &mut self.elements {
            element.read_data(reader, rows)?;
        }
        Ok(())
    }
}
