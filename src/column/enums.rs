//! `Enum8` / `Enum16` columns: an `i8`/`i16` ordinal per row, presented as the
//! declared label.

use std::io::Read;

use super::{corrupt, mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::{EnumWidth, TypeDescriptor};
use crate::utils::{read_typed_vec, typed_slice_to_bytes};
use crate::value::Value;

#[derive(Debug)]
pub struct EnumColumn {
    descriptor: TypeDescriptor,
    width: EnumWidth,
    variants: Vec<(String, i16)>,
    ordinals: Vec<i16>,
}

impl EnumColumn {
    pub fn new(descriptor: TypeDescriptor, width: EnumWidth, variants: Vec<(String, i16)>) -> Self {
        Self {
            descriptor,
            width,
            variants,
            ordinals: Vec::new(),
        }
    }

    fn label_of(&self, ordinal: i16) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, o)| *o == ordinal)
            .map(|(label, _)| label.as_str())
    }

    fn declared_labels(&self) -> String {
        self.variants
            .iter()
            .map(|(label, _)| format!("'{}'", label))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl ColumnCodec for EnumColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.ordinals.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let ordinal = match value {
            Value::Null => return Err(reject_null(&self.descriptor)),
            Value::String(label) => self
                .variants
                .iter()
                .find(|(l, _)| l == label)
                .map(|(_, o)| *o)
                .ok_or_else(|| {
                    mismatch(
                        &self.descriptor,
                        value,
                        format!("unknown label '{}', expected one of {}", label, self.declared_labels()),
                    )
                })?,
            other => {
                let declared = other
                    .to_bigint()
                    .and_then(|n| i16::try_from(n).ok())
                    .filter(|o| self.label_of(*o).is_some());
                declared.ok_or_else(|| {
                    mismatch(&self.descriptor, other, "expected a declared label or ordinal")
                })?
            }
        };
        self.ordinals.push(ordinal);
        Ok(())
    }

    /// The first declared entry stands in for the zero value.
    fn append_default(&mut self) {
        let first = self.variants.first().map(|(_, o)| *o).unwrap_or(0);
        self.ordinals.push(first);
    }

    fn value(&self, row: usize) -> Value {
        let ordinal = self.ordinals[row];
        match self.label_of(ordinal) {
            Some(label) => Value::String(label.to_string()),
            None => Value::Int16(ordinal),
        }
    }

    fn truncate(&mut self, rows: usize) {
        self.ordinals.truncate(rows);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        match self.width {
            EnumWidth::Enum8 => buf.extend(self.ordinals.iter().map(|o| *o as i8 as u8)),
            EnumWidth::Enum16 => buf.extend_from_slice(typed_slice_to_bytes(&self.ordinals)),
        }
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let ordinals: Vec<i16> = match self.width {
            EnumWidth::Enum8 => read_typed_vec::<i8>(reader, rows)?
                .into_iter()
                .map(i16::from)
                .collect(),
            EnumWidth::Enum16 => read_typed_vec::<i16>(reader, rows)?,
        };
        if let Some(bad) = ordinals.iter().find(|o| self.label_of(**o).is_none()) {
            return Err(corrupt(format!("enum value {} is not declared", bad)));
        }
        self.ordinals.extend(ordinals);
        Ok(())
    }
}
