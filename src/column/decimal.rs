//! Decimal columns. The storage width follows the precision: up to 9 digits
//! in an `i32`, 18 in an `i64`, 38 in an `i128` and 76 in an `i256`.

use std::io::Read;

use num_bigint::BigInt;
use num_traits::Signed;

use super::bigint::{bigint_to_le, le_to_bigint};
use super::{mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::TypeDescriptor;
use crate::utils::{checked_len, read_bytes};
use crate::value::{pow10, Decimal, Value};

pub(crate) fn storage_width(precision: u8) -> usize {
    match precision {
        0..=9 => 4,
        10..=18 => 8,
        19..=38 => 16,
        _ => 32,
    }
}

#[derive(Debug)]
pub struct DecimalColumn {
    descriptor: TypeDescriptor,
    scale: u32,
    width: usize,
    /// `10^precision`; every mantissa must be strictly smaller in magnitude.
    limit: BigInt,
    data: Vec<u8>,
}

impl DecimalColumn {
    pub fn new(precision: u8, scale: u8) -> Self {
        Self {
            descriptor: TypeDescriptor::Decimal { precision, scale },
            scale: scale as u32,
            width: storage_width(precision),
            limit: pow10(precision as u32),
            data: Vec::new(),
        }
    }

    fn to_decimal(&self, value: &Value) -> Result<Decimal, ConversionError> {
        match value {
            Value::Decimal(d) => Ok(d.clone()),
            Value::Null => Err(reject_null(&self.descriptor)),
            other => match other.to_bigint() {
                Some(int) => Ok(Decimal::new(int, 0)),
                None => Err(mismatch(&self.descriptor, other, "expected a decimal or integer value")),
            },
        }
    }
}

impl ColumnCodec for DecimalColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.data.len() / self.width
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let decimal = self.to_decimal(value)?;
        let rescaled = decimal.rescale(self.scale).ok_or_else(|| {
            mismatch(
                &self.descriptor,
                value,
                format!("{} cannot be represented with scale {} without loss", decimal, self.scale),
            )
        })?;
        if rescaled.mantissa().abs() >= self.limit {
            return Err(mismatch(
                &self.descriptor,
                value,
                format!("{} exceeds the declared precision", decimal),
            ));
        }
        let bytes = bigint_to_le(rescaled.mantissa(), self.width, true).ok_or_else(|| {
            mismatch(&self.descriptor, value, "mantissa does not fit the storage width")
        })?;
        self.data.extend_from_slice(&bytes);
        Ok(())
    }

    fn append_default(&mut self) {
        self.data.resize(self.data.len() + self.width, 0);
    }

    fn value(&self, row: usize) -> Value {
        let start = row * self.width;
        let mantissa = le_to_bigint(&self.data[start..start + self.width], true);
        Value::Decimal(Decimal::new(mantissa, self.scale))
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
