//! Fixed-width integer and float columns. The buffer is a plain `Vec<T>` whose
//! bytes are the wire bytes, so encoding and decoding are single casts.

use std::io::Read;

use super::{mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::traits::NativeScalar;
use crate::types::{ScalarKind, TypeDescriptor};
use crate::utils::{read_typed_vec, typed_slice_to_bytes};
use crate::value::Value;

#[derive(Debug)]
pub struct NumericColumn<T: NativeScalar> {
    descriptor: TypeDescriptor,
    data: Vec<T>,
}

impl<T: NativeScalar> NumericColumn<T> {
    pub fn new(kind: ScalarKind) -> Self {
        Self {
            descriptor: TypeDescriptor::Scalar(kind),
            data: Vec::new(),
        }
    }
}

impl<T: NativeScalar> ColumnCodec for NumericColumn<T> {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.data.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        if value.is_null() {
            return Err(reject_null(&self.descriptor));
        }
        let converted = T::from_value(value).ok_or_else(|| {
            let reason = if value.to_bigint().is_some() {
                format!("value is out of range for {}", T::TYPE_NAME)
            } else {
                format!("expected a numeric value compatible with {}", T::TYPE_NAME)
            };
            mismatch(&self.descriptor, value, reason)
        })?;
        self.data.push(converted);
        Ok(())
    }

    fn append_default(&mut self) {
        self.data.push(T::default());
    }

    fn value(&self, row: usize) -> Value {
        self.data[row].into_value()
    }

    fn truncate(&mut self, rows: usize) {
        self.data.truncate(rows);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(typed_slice_to_bytes(&self.data));
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let values = read_typed_vec::<T>(reader, rows)?;
        self.data.extend(values);
        Ok(())
    }
}

/// `BFloat16` keeps the upper half of an `f32`; values surface as `Float32`.
#[derive(Debug)]
pub struct BFloat16Column {
    descriptor: TypeDescriptor,
    data: Vec<u16>,
}

impl BFloat16Column {
    pub fn new() -> Self {
        Self {
            descriptor: TypeDescriptor::Scalar(ScalarKind::BFloat16),
            data: Vec::new(),
        }
    }
}

impl ColumnCodec for BFloat16Column {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.data.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        match value {
            Value::Float32(v) => {
                self.data.push((v.to_bits() >> 16) as u16);
                Ok(())
            }
            Value::Null => Err(reject_null(&self.descriptor)),
            other => Err(mismatch(&self.descriptor, other, "expected a Float32 value")),
        }
    }

    fn append_default(&mut self) {
        self.data.push(0);
    }

    fn value(&self, row: usize) -> Value {
        Value::Float32(f32::from_bits((self.data[row] as u32) << 16))
    }

    fn truncate(&mut self, rows: usize) {
        self.data.truncate(rows);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(typed_slice_to_bytes(&self.data));
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        self.data.extend(read_typed_vec::<u16>(reader, rows)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_int32_wire_bytes() {
        let mut col = NumericColumn::<i32>::new(ScalarKind::Int32);
        col.append(&Value::Int32(-2)).unwrap();
        col.append(&Value::UInt8(7)).unwrap();
        let mut buf = Vec::new();
        col.write_data(&mut buf);
        assert_eq!(buf, vec![0xfe, 0xff, 0xff, 0xff, 7, 0, 0, 0]);

        let mut decoded = NumericColumn::<i32>::new(ScalarKind::Int32);
        decoded.read_data(&mut Cursor::new(buf), 2).unwrap();
        assert_eq!(decoded.value(0), Value::Int32(-2));
        assert_eq!(decoded.value(1), Value::Int32(7));
    }

    #[test]
    fn test_rejections_leave_column_unchanged() {
        let mut col = NumericColumn::<u8>::new(ScalarKind::UInt8);
        let err = col.append(&Value::Int16(300)).unwrap_err();
        assert!(err.reason.contains("out of range"));
        let err = col.append(&Value::String("12".into())).unwrap_err();
        assert_eq!(err.value_type, "String");
        assert!(col.append(&Value::Null).is_err());
        assert_eq!(col.rows(), 0);
    }

    #[test]
    fn test_bfloat16_keeps_upper_bits() {
        let mut col = BFloat16Column::new();
        col.append(&Value::Float32(1.5)).unwrap();
        col.append(&Value::Float32(-2.0)).unwrap();
        assert_eq!(col.value(0), Value::Float32(1.5));
        assert_eq!(col.value(1), Value::Float32(-2.0));
        let mut buf = Vec::new();
        col.write_data(&mut buf);
        assert_eq!(buf.len(), 4);
    }
}
