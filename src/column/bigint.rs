//! 128- and 256-bit integer columns, stored as raw little-endian two's
//! complement words and surfaced as `BigInt`. The helpers here are shared
//! with the wide decimal storage.

use std::io::Read;

use num_bigint::{BigInt, Sign};

use super::{mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::{ScalarKind, TypeDescriptor};
use crate::utils::{checked_len, read_bytes};
use crate::value::Value;

/// Encodes `value` into exactly `width` little-endian bytes, or `None` if it
/// does not fit.
pub(crate) fn bigint_to_le(value: &BigInt, width: usize, signed: bool) -> Option<Vec<u8>> {
    if signed {
        let mut bytes = value.to_signed_bytes_le();
        if bytes.len() > width {
            return None;
        }
        let fill = if value.sign() == Sign::Minus { 0xFF } else { 0x00 };
        bytes.resize(width, fill);
        Some(bytes)
    } else {
        if value.sign() == Sign::Minus {
            return None;
        }
        let (_, mut bytes) = value.to_bytes_le();
        if bytes.len() > width {
            return None;
        }
        bytes.resize(width, 0);
        Some(bytes)
    }
}

pub(crate) fn le_to_bigint(bytes: &[u8], signed: bool) -> BigInt {
    if signed {
        BigInt::from_signed_bytes_le(bytes)
    } else {
        BigInt::from_bytes_le(Sign::Plus, bytes)
    }
}

#[derive(Debug)]
pub struct WideIntColumn {
    descriptor: TypeDescriptor,
    width: usize,
    signed: bool,
    data: Vec<u8>,
}

impl WideIntColumn {
    pub fn new(kind: ScalarKind) -> Self {
        let signed = matches!(kind, ScalarKind::Int128 | ScalarKind::Int256);
        Self {
            descriptor: TypeDescriptor::Scalar(kind),
            width: kind.width().unwrap_or(16),
            signed,
            data: Vec::new(),
        }
    }
}

impl ColumnCodec for WideIntColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.data.len() / self.width
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let wide = match value {
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => other
                .to_bigint()
                .ok_or_else(|| mismatch(&self.descriptor, other, "expected an integer value"))?,
        };
        let bytes = bigint_to_le(&wide, self.width, self.signed).ok_or_else(|| {
            mismatch(&self.descriptor, value, format!("{} is out of range", wide))
        })?;
        self.data.extend_from_slice(&bytes);
        Ok(())
    }

    fn append_default(&mut self) {
        self.data.resize(self.data.len() + self.width, 0);
    }

    fn value(&self, row: usize) -> Value {
        let start = row * self.width;
        Value::BigInt(le_to_bigint(&self.data[start..start + self.width], self.signed))
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
