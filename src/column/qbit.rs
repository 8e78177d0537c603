//! `QBit(T, dimension)`: fixed-length float vectors stored transposed into
//! bit planes.
//!
//! A `T` of `W` bits becomes a `Tuple` of `W` `FixedString(ceil(dimension/8))`
//! columns. Plane `p` holds bit `W-1-p` of every element, so the first plane
//! carries the sign bits; element `j` sits at byte `j/8`, bit `j%8`.

use std::io::Read;

use super::string::FixedStringColumn;
use super::{mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::{ScalarKind, TypeDescriptor};
use crate::value::Value;

#[derive(Debug)]
pub struct QBitColumn {
    descriptor: TypeDescriptor,
    element: ScalarKind,
    dimension: usize,
    /// Bit patterns of every element, `dimension` per row.
    bits: Vec<u64>,
}

impl QBitColumn {
    pub fn new(
        descriptor: TypeDescriptor,
        element: ScalarKind,
        dimension: u32,
    ) -> Result<Self, ChwireError> {
        if !matches!(element, ScalarKind::BFloat16 | ScalarKind::Float32 | ScalarKind::Float64) {
            return Err(ChwireError::Unsupported(format!(
                "QBit over {}; expected BFloat16, Float32 or Float64",
                element.name()
            )));
        }
        if dimension == 0 {
            return Err(ChwireError::Unsupported("QBit with zero dimension".into()));
        }
        Ok(Self {
            descriptor,
            element,
            dimension: dimension as usize,
            bits: Vec::new(),
        })
    }

    fn bit_width(&self) -> usize {
        match self.element {
            ScalarKind::BFloat16 => 16,
            ScalarKind::Float32 => 32,
            _ => 64,
        }
    }

    fn plane_bytes(&self) -> usize {
        self.dimension.div_ceil(8)
    }

    fn element_bits(&self, value: &Value) -> Option<u64> {
        match (self.element, value) {
            (ScalarKind::BFloat16, Value::Float32(v)) => Some(u64::from(v.to_bits() >> 16)),
            (ScalarKind::Float32, Value::Float32(v)) => Some(u64::from(v.to_bits())),
            (ScalarKind::Float64, Value::Float64(v)) => Some(v.to_bits()),
            (ScalarKind::Float64, Value::Float32(v)) => Some(f64::from(*v).to_bits()),
            _ => None,
        }
    }

    fn element_value(&self, bits: u64) -> Value {
        match self.element {
            ScalarKind::BFloat16 => Value::Float32(f32::from_bits((bits as u32) << 16)),
            ScalarKind::Float32 => Value::Float32(f32::from_bits(bits as u32)),
            _ => Value::Float64(f64::from_bits(bits)),
        }
    }
}

impl ColumnCodec for QBitColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.bits.len() / self.dimension
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let items = match value {
            Value::Array(items) => items,
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => return Err(mismatch(&self.descriptor, other, "expected an array of floats")),
        };
        if items.len() != self.dimension {
            return Err(mismatch(
                &self.descriptor,
                value,
                format!("expected {} elements, got {}", self.dimension, items.len()),
            ));
        }
        let mut row = Vec::with_capacity(self.dimension);
        for item in items {
            let bits = self.element_bits(item).ok_or_else(|| {
                mismatch(
                    &self.descriptor,
                    item,
                    format!("element is not a {}", self.element.name()),
                )
            })?;
            row.push(bits);
        }
        self.bits.extend(row);
        Ok(())
    }

    fn append_default(&mut self) {
        self.bits.resize(self.bits.len() + self.dimension, 0);
    }

    fn value(&self, row: usize) -> Value {
        let start = row * self.dimension;
        Value::Array(
            self.bits[start..start + self.dimension]
                .iter()
                .map(|b| self.element_value(*b))
                .collect(),
        )
    }

    fn truncate(&mut self, rows: usize) {
        self.bits.truncate(rows * self.dimension);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        let width = self.bit_width();
        let plane_bytes = self.plane_bytes();
        for plane in 0..width {
            let shift = width - 1 - plane;
            for row in self.bits.chunks(self.dimension) {
                let mut packed = vec![0u8; plane_bytes];
                for (j, bits) in row.iter().enumerate() {
                    if (bits >> shift) & 1 == 1 {
                        packed[j / 8] |= 1 << (j % 8);
                    }
                }
                buf.extend_from_slice(&packed);
            }
        }
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let width = self.bit_width();
        let mut decoded = vec![0u64; rows * self.dimension];
        for plane in 0..width {
            let shift = width - 1 - plane;
            let mut column = FixedStringColumn::new(self.plane_bytes());
            column.read_data(reader, rows)?;
            for row in 0..rows {
                let packed = column.row_bytes(row);
                let elements = &mut decoded[row * self.dimension..(row + 1) * self.dimension];
                for (j, bits) in elements.iter_mut().enumerate() {
                    if (packed[j / 8] >> (j % 8)) & 1 == 1 {
                        *bits |= 1 << shift;
                    }
                }
            }
        }
        self.bits.extend(decoded);
        Ok(())
    }
}
