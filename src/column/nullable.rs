//! `Nullable(T)`: a null map followed by the nested column, which holds a
//! default value at every NULL row.

use std::io::Read;

use super::ColumnCodec;
use crate::error::{ChwireError, ConversionError};
use crate::null_handling::{read_null_map, write_null_map};
use crate::types::TypeDescriptor;
use crate::value::Value;

#[derive(Debug)]
pub struct NullableColumn {
    descriptor: TypeDescriptor,
    nulls: Vec<u8>,
    inner: Box<dyn ColumnCodec>,
}

impl NullableColumn {
    pub fn new(descriptor: TypeDescriptor, inner: Box<dyn ColumnCodec>) -> Self {
        Self {
            descriptor,
            nulls: Vec::new(),
            inner,
        }
    }
}

impl ColumnCodec for NullableColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.nulls.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        if value.is_null() {
            self.inner.append_default();
            self.nulls.push(1);
        } else {
            self.inner
                .append(value)
                .map_err(|e| ConversionError { declared_type: self.descriptor.to_string(), ..e })?;
            self.nulls.push(0);
        }
        Ok(())
    }

    fn append_default(&mut self) {
        self.inner.append_default();
        self.nulls.push(1);
    }

    fn value(&self, row: usize) -> Value {
        if self.nulls[row] != 0 {
            Value::Null
        } else {
            self.inner.value(row)
        }
    }

    fn truncate(&mut self, rows: usize) {
        self.nulls.truncate(rows);
        self.inner.truncate(rows);
    }

    fn write_prefix(&self, buf: &mut Vec<u8>) {
        self.inner.write_prefix(buf);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        write_null_map(buf, &self.nulls);
        self.inner.write_data(buf);
    }

    fn read_prefix(&mut self, reader: &mut dyn Read) -> Result<(), ChwireError> {
        self.inner.read_prefix(reader)
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let nulls = read_null_map(reader, rows)?;
        self.inner.read_data(reader, rows)?;
        self.nulls.extend(nulls);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{new_column, CodecOptions};
    use crate::types::parse_type;
    use std::io::Cursor;

    #[test]
    fn test_nullable_string_layout() {
        let ty = parse_type("Nullable(String)").unwrap();
        let mut col = new_column(&ty, &CodecOptions::default()).unwrap();
        col.append(&Value::String("x".into())).unwrap();
        col.append(&Value::Null).unwrap();
        let mut buf = Vec::new();
        col.write_data(&mut buf);
        assert_eq!(buf, vec![0, 1, 1, b'x', 0]);

        let mut decoded = new_column(&ty, &CodecOptions::default()).unwrap();
        decoded.read_data(&mut Cursor::new(buf), 2).unwrap();
        assert_eq!(decoded.value(0), Value::String("x".into()));
        assert_eq!(decoded.value(1), Value::Null);
    }

    #[test]
    fn test_inner_error_names_nullable_type() {
        let ty = parse_type("Nullable(UInt8)").unwrap();
        let mut col = new_column(&ty, &CodecOptions::default()).unwrap();
        let err = col.append(&Value::String("1".into())).unwrap_err();
        assert_eq!(err.declared_type, "Nullable(UInt8)");
        assert_eq!(col.rows(), 0);
    }
}
