//! `Dynamic[(max_types=N)]`: a `Variant` whose alternatives are discovered
//! from the values themselves.
//!
//! Prefix: u64 structure version (1), varint max types, varint type count,
//! the type names, then the prefix of the underlying variant. The variant
//! always carries one extra `SharedVariant` alternative; it is not listed
//! among the type names but takes part in the discriminant order, which is
//! the sorted order of all names. `SharedVariant` rows hold values in a
//! per-row binary encoding that is surfaced as raw bytes.

use std::io::Read;

use super::variant::{VariantColumn, NULL_DISCRIMINANT};
use super::{corrupt, mismatch, new_column, CodecOptions, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::{parse_type, ScalarKind, TypeDescriptor};
use crate::value::Value;
use crate::wire;

const STRUCTURE_VERSION: u64 = 1;
pub(crate) const DEFAULT_MAX_TYPES: u32 = 32;
const SHARED_VARIANT: &str = "SharedVariant";

fn shared_variant_column(options: &CodecOptions) -> Result<Box<dyn ColumnCodec>, ChwireError> {
    new_column(&TypeDescriptor::Scalar(ScalarKind::String), options)
}

/// The alternative names and their variant, still in wire order.
#[derive(Debug)]
struct Structure {
    names: Vec<String>,
    variant: VariantColumn,
}

#[derive(Debug)]
pub struct DynamicColumn {
    descriptor: TypeDescriptor,
    max_types: u32,
    options: CodecOptions,
    /// Alternative names in insertion order; index 0 is `SharedVariant`.
    names: Vec<String>,
    variant: VariantColumn,
    /// Structure read by `read_prefix`, consumed by the next `read_data`.
    pending: Option<Structure>,
}

impl DynamicColumn {
    pub fn new(descriptor: TypeDescriptor, max_types: Option<u32>, options: CodecOptions) -> Self {
        let mut column = Self {
            variant: VariantColumn::new(descriptor.clone(), Vec::new()),
            descriptor,
            max_types: max_types.unwrap_or(DEFAULT_MAX_TYPES),
            options,
            names: Vec::new(),
            pending: None,
        };
        column.reset();
        column
    }

    fn reset(&mut self) {
        let mut variant = VariantColumn::new(self.descriptor.clone(), Vec::new());
        // A String column cannot fail to build.
        if let Ok(shared) = shared_variant_column(&self.options) {
            variant.push_alternative(shared);
        }
        self.variant = variant;
        self.names = vec![SHARED_VARIANT.to_string()];
        self.pending = None;
    }

    /// Alternative indices in sorted-name order, i.e. wire discriminant order.
    fn wire_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.names.len()).collect();
        order.sort_by(|a, b| self.names[*a].cmp(&self.names[*b]));
        order
    }

    fn shared_index(names: &[String]) -> Option<usize> {
        names.iter().position(|n| n == SHARED_VARIANT)
    }

    fn value_of(names: &[String], variant: &VariantColumn, row: usize) -> Value {
        let discriminant = variant.discriminants()[row];
        let value = variant.value(row);
        if discriminant != NULL_DISCRIMINANT && names[discriminant as usize] == SHARED_VARIANT {
            return match value {
                Value::String(s) => Value::Bytes(s.into_bytes()),
                other => other,
            };
        }
        value
    }

    fn read_structure(&self, reader: &mut dyn Read) -> Result<Structure, ChwireError> {
        let version = wire::read_u64(reader)?;
        if version != STRUCTURE_VERSION {
            return Err(ChwireError::Unsupported(format!(
                "Dynamic structure serialization version {}",
                version
            )));
        }
        let _max_types = wire::read_varint(reader)?;
        let count = wire::read_varint(reader)?;
        if count >= u64::from(NULL_DISCRIMINANT) {
            return Err(corrupt(format!("Dynamic column lists {} types", count)));
        }
        let mut entries = Vec::with_capacity(count as usize + 1);
        for _ in 0..count {
            let name = wire::read_string(reader)?;
            let ty = parse_type(&name).map_err(corrupt)?;
            entries.push((name, new_column(&ty, &self.options)?));
        }
        entries.push((SHARED_VARIANT.to_string(), shared_variant_column(&self.options)?));
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut names = Vec::with_capacity(entries.len());
        let mut variant = VariantColumn::new(self.descriptor.clone(), Vec::new());
        for (name, column) in entries {
            names.push(name);
            variant.push_alternative(column);
        }
        variant.read_prefix(reader)?;
        Ok(Structure { names, variant })
    }
}

impl ColumnCodec for DynamicColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.variant.rows()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let ty = match TypeDescriptor::infer_from_value(value) {
            Some(ty) => ty,
            None => {
                self.variant.push_null();
                return Ok(());
            }
        };
        let name = ty.to_string();
        if let Some(index) = self.names.iter().position(|n| *n == name) {
            return self.variant.append_to(index, value).map_err(|e| ConversionError {
                declared_type: self.descriptor.to_string(),
                ..e
            });
        }

        if self.names.len() > self.max_types as usize {
            return Err(mismatch(
                &self.descriptor,
                value,
                format!("the column already holds {} distinct types", self.max_types),
            ));
        }
        let column = new_column(&ty, &self.options)
            .map_err(|e| mismatch(&self.descriptor, value, e.to_string()))?;
        self.variant.push_alternative(column);
        self.names.push(name);
        let index = self.names.len() - 1;
        if let Err(e) = self.variant.append_to(index, value) {
            self.variant.pop_alternative();
            self.names.pop();
            return Err(ConversionError { declared_type: self.descriptor.to_string(), ..e });
        }
        Ok(())
    }

    fn append_default(&mut self) {
        self.variant.push_null();
    }

    fn value(&self, row: usize) -> Value {
        Self::value_of(&self.names, &self.variant, row)
    }

    /// Truncating to zero rows also forgets the discovered types.
    fn truncate(&mut self, rows: usize) {
        if rows == 0 {
            self.reset();
        } else {
            self.variant.truncate(rows);
        }
    }

    fn write_prefix(&self, buf: &mut Vec<u8>) {
        let order = self.wire_order();
        wire::write_u64(buf, STRUCTURE_VERSION);
        wire::write_varint(buf, u64::from(self.max_types));
        wire::write_varint(buf, (self.names.len() - 1) as u64);
        for index in &order {
            let name = &self.names[*index];
            if name != SHARED_VARIANT {
                wire::write_string(buf, name.as_bytes());
            }
        }
        self.variant.write_prefix_reordered(&order, buf);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        self.variant.write_reordered(&self.wire_order(), buf);
    }

    fn read_prefix(&mut self, reader: &mut dyn Read) -> Result<(), ChwireError> {
        self.pending = Some(self.read_structure(reader)?);
        Ok(())
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let Some(mut incoming) = self.pending.take() else {
            if rows == 0 {
                return Ok(());
            }
            return Err(corrupt("Dynamic data without a structure prefix"));
        };
        incoming.variant.read_data(reader, rows)?;

        if self.rows() == 0 {
            if Self::shared_index(&incoming.names).is_none() {
                return Err(corrupt("Dynamic structure lost its SharedVariant"));
            }
            self.names = incoming.names;
            self.variant = incoming.variant;
            return Ok(());
        }
        for row in 0..incoming.variant.rows() {
            let value = Self::value_of(&incoming.names, &incoming.variant, row);
            self.append(&value).map_err(corrupt)?;
        }
        Ok(())
    }
}
