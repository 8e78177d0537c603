//! `Variant(T1, ..., Tn)`: one discriminant byte per row (255 = NULL) and the
//! rows of each alternative stored densely in its own column.
//!
//! Alternatives are kept in canonical-name order, which is the discriminant
//! order the server uses.

use std::io::Read;

use super::{corrupt, mismatch, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::TypeDescriptor;
use crate::utils::read_bytes;
use crate::value::Value;
use crate::wire;

pub(crate) const NULL_DISCRIMINANT: u8 = 255;
const BASIC_DISCRIMINATORS_MODE: u64 = 0;

#[derive(Debug)]
pub struct VariantColumn {
    descriptor: TypeDescriptor,
    alternatives: Vec<Box<dyn ColumnCodec>>,
    discriminants: Vec<u8>,
    /// Row index inside the chosen alternative, for every row.
    local_rows: Vec<usize>,
}

impl VariantColumn {
    pub fn new(descriptor: TypeDescriptor, alternatives: Vec<Box<dyn ColumnCodec>>) -> Self {
        Self {
            descriptor,
            alternatives,
            discriminants: Vec::new(),
            local_rows: Vec::new(),
        }
    }

    pub(crate) fn push_alternative(&mut self, column: Box<dyn ColumnCodec>) {
        self.alternatives.push(column);
    }

    /// Removes the last alternative. It must not hold any rows.
    pub(crate) fn pop_alternative(&mut self) {
        self.alternatives.pop();
    }

    pub(crate) fn discriminants(&self) -> &[u8] {
        &self.discriminants
    }

    /// Appends `value` to alternative `index`.
    pub(crate) fn append_to(&mut self, index: usize, value: &Value) -> Result<(), ConversionError> {
        let column = &mut self.alternatives[index];
        let local = column.rows();
        column.append(value)?;
        self.discriminants.push(index as u8);
        self.local_rows.push(local);
        Ok(())
    }

    pub(crate) fn push_null(&mut self) {
        self.discriminants.push(NULL_DISCRIMINANT);
        self.local_rows.push(0);
    }

    pub(crate) fn write_prefix_reordered(&self, order: &[usize], buf: &mut Vec<u8>) {
        wire::write_u64(buf, BASIC_DISCRIMINATORS_MODE);
        for index in order {
            self.alternatives[*index].write_prefix(buf);
        }
    }

    /// Writes the discriminants and alternatives in the order `order` gives,
    /// renumbering discriminants to positions in that order. Used by `Dynamic`,
    /// whose alternatives live in insertion order.
    pub(crate) fn write_reordered(&self, order: &[usize], buf: &mut Vec<u8>) {
        let mut position = vec![0u8; self.alternatives.len()];
        for (pos, index) in order.iter().enumerate() {
            position[*index] = pos as u8;
        }
        buf.extend(self.discriminants.iter().map(|d| {
            if *d == NULL_DISCRIMINANT {
                NULL_DISCRIMINANT
            } else {
                position[*d as usize]
            }
        }));
        for index in order {
            self.alternatives[*index].write_data(buf);
        }
    }
}

impl ColumnCodec for VariantColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.discriminants.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        if value.is_null() {
            self.push_null();
            return Ok(());
        }
        let exact = self
            .alternatives
            .iter()
            .position(|c| c.descriptor().matches_value(value));
        if let Some(index) = exact {
            if self.append_to(index, value).is_ok() {
                return Ok(());
            }
        }
        for index in 0..self.alternatives.len() {
            if Some(index) != exact && self.append_to(index, value).is_ok() {
                return Ok(());
            }
        }
        Err(mismatch(&self.descriptor, value, "no alternative accepts the value"))
    }

    fn append_default(&mut self) {
        self.push_null();
    }

    fn value(&self, row: usize) -> Value {
        match self.discriminants[row] {
            NULL_DISCRIMINANT => Value::Null,
            d => self.alternatives[d as usize].value(self.local_rows[row]),
        }
    }

    fn truncate(&mut self, rows: usize) {
        if rows >= self.discriminants.len() {
            return;
        }
        self.discriminants.truncate(rows);
        self.local_rows.truncate(rows);
        let mut counts = vec![0usize; self.alternatives.len()];
        for d in &self.discriminants {
            if *d != NULL_DISCRIMINANT {
                counts[*d as usize] += 1;
            }
        }
        for (column, count) in self.alternatives.iter_mut().zip(counts) {
            column.truncate(count);
        }
    }

    fn write_prefix(&self, buf: &mut Vec<u8>) {
        wire::write_u64(buf, BASIC_DISCRIMINATORS_MODE);
        for column in &self.alternatives {
            column.write_prefix(buf);
        }
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.discriminants);
        for column in &self.alternatives {
            column.write_data(buf);
        }
    }

    fn read_prefix(&mut self, reader: &mut dyn Read) -> Result<(), ChwireError> {
        let mode = wire::read_u64(reader)?;
        if mode != BASIC_DISCRIMINATORS_MODE {
            return Err(ChwireError::Unsupported(format!(
                "Variant discriminators serialization mode {}",
                mode
            )));
        }
        for column in &mut self.alternatives {
            column.read_prefix(reader)?;
        }
        Ok(())
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let discriminants = read_bytes(reader, rows)?;
        let mut counts = vec![0usize; self.alternatives.len()];
        let mut bases: Vec<usize> = self.alternatives.iter().map(|c| c.rows()).collect();
        for d in &discriminants {
            if *d == NULL_DISCRIMINANT {
                continue;
            }
            let slot = counts
                .get_mut(*d as usize)
                .ok_or_else(|| corrupt(format!("discriminant {} out of range", d)))?;
            *slot += 1;
        }
        for (column, count) in self.alternatives.iter_mut().zip(&counts) {
            column.read_data(reader, *count)?;
        }
        for d in discriminants {
            self.discriminants.push(d);
            if d == NULL_DISCRIMINANT {
                self.local_rows.push(0);
            } else {
                let base = &mut bases[d as usize];
                self.local_rows.push(*base);
                *base += 1;
            }
        }
        Ok(())
    }
}
