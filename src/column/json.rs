//! `JSON` in its string serialization: a u64 serialization-version prefix
//! and one JSON document per row, written as a length-prefixed string.

use std::io::Read;

use super::string::StringColumn;
use super::{corrupt, mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::TypeDescriptor;
use crate::value::Value;
use crate::wire;

const STRING_SERIALIZATION_VERSION: u64 = 1;

#[derive(Debug)]
pub struct JsonColumn {
    descriptor: TypeDescriptor,
    documents: Vec<serde_json::Value>,
}

impl JsonColumn {
    pub fn new(descriptor: TypeDescriptor) -> Self {
        Self {
            descriptor,
            documents: Vec::new(),
        }
    }
}

impl ColumnCodec for JsonColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.documents.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let document = match value {
            Value::Json(document) => document.clone(),
            Value::String(text) => serde_json::from_str(text)
                .map_err(|e| mismatch(&self.descriptor, value, format!("invalid JSON: {}", e)))?,
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => {
                return Err(mismatch(&self.descriptor, other, "expected a JSON document or text"))
            }
        };
        self.documents.push(document);
        Ok(())
    }

    fn append_default(&mut self) {
        self.documents.push(serde_json::Value::Object(serde_json::Map::new()));
    }

    fn value(&self, row: usize) -> Value {
        Value::Json(self.documents[row].clone())
    }

    fn truncate(&mut self, rows: usize) {
        self.documents.truncate(rows);
    }

    fn write_prefix(&self, buf: &mut Vec<u8>) {
        wire::write_u64(buf, STRING_SERIALIZATION_VERSION);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        for document in &self.documents {
            wire::write_string(buf, document.to_string().as_bytes());
        }
    }

    fn read_prefix(&mut self, reader: &mut dyn Read) -> Result<(), ChwireError> {
        let version = wire::read_u64(reader)?;
        if version != STRING_SERIALIZATION_VERSION {
            return Err(ChwireError::Unsupported(format!(
                "JSON serialization version {} (enable output_format_native_write_json_as_string)",
                version
            )));
        }
        Ok(())
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let mut texts = StringColumn::new();
        texts.read_data(reader, rows)?;
        self.documents.reserve(rows);
        for row in 0..rows {
            let document = serde_json::from_slice(texts.row_bytes(row))
                .map_err(|e| corrupt(format!("row {} is not valid JSON: {}", row, e)))?;
            self.documents.push(document);
        }
        Ok(())
    }
}
