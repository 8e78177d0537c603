//! `LowCardinality(T)`: a per-block dictionary of distinct values plus one
//! key per row.
//!
//! Prefix: u64 key serialization version (1, shared dictionaries with
//! additional keys). Data: u64 flags (key width code in the low byte, plus
//! the has-additional-keys and update-dictionary bits), u64 dictionary size,
//! the dictionary as a plain `T` column, u64 key count, then the keys at the
//! narrowest width that can address the dictionary. For `Nullable(T)` key 0
//! is NULL and the dictionary holds a placeholder there.

use std::io::Read;

use hashbrown::HashMap;

use super::{corrupt, new_column, reject_null, CodecOptions, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::TypeDescriptor;
use crate::utils::{read_typed_vec, MAX_READ_ALLOCATION};
use crate::value::Value;
use crate::wire;

const KEY_SERIALIZATION_VERSION: u64 = 1;
const KEY_WIDTH_MASK: u64 = 0xff;
const NEED_GLOBAL_DICTIONARY: u64 = 1 << 8;
const HAS_ADDITIONAL_KEYS: u64 = 1 << 9;
const NEED_UPDATE_DICTIONARY: u64 = 1 << 10;

fn key_width_code(dictionary_rows: usize) -> u64 {
    match dictionary_rows as u64 {
        0..=0x100 => 0,
        0x101..=0x1_0000 => 1,
        0x1_0001..=0x1_0000_0000 => 2,
        _ => 3,
    }
}

#[derive(Debug)]
pub struct LowCardinalityColumn {
    descriptor: TypeDescriptor,
    dictionary_type: TypeDescriptor,
    options: CodecOptions,
    nullable: bool,
    dictionary: Box<dyn ColumnCodec>,
    /// Single-row column used to turn a value into its wire bytes for lookups.
    scratch: Box<dyn ColumnCodec>,
    index: HashMap<Vec<u8>, u64>,
    /// Set when `dictionary` was replaced by a decoded one and `index` no
    /// longer describes it.
    index_stale: bool,
    keys: Vec<u64>,
}

impl LowCardinalityColumn {
    pub fn new(
        descriptor: TypeDescriptor,
        inner: &TypeDescriptor,
        options: &CodecOptions,
    ) -> Result<Self, ChwireError> {
        let dictionary_type = inner.strip_nullable().clone();
        let mut column = Self {
            descriptor,
            dictionary: new_column(&dictionary_type, options)?,
            scratch: new_column(&dictionary_type, options)?,
            dictionary_type,
            options: *options,
            nullable: inner.is_nullable(),
            index: HashMap::new(),
            index_stale: false,
            keys: Vec::new(),
        };
        column.reset();
        Ok(column)
    }

    fn reset(&mut self) {
        self.keys.clear();
        self.dictionary.clear();
        self.index.clear();
        self.index_stale = false;
        if self.nullable {
            self.dictionary.append_default();
        }
    }

    fn first_key(&self) -> usize {
        self.nullable as usize
    }

    fn scratch_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        self.scratch.write_data(&mut bytes);
        bytes
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for row in self.first_key()..self.dictionary.rows() {
            let value = self.dictionary.value(row);
            self.scratch.clear();
            if self.scratch.append(&value).is_ok() {
                let bytes = self.scratch_bytes();
                self.index.entry(bytes).or_insert(row as u64);
            }
        }
        self.index_stale = false;
    }

    /// The dictionary key of `value`, inserting it if it is new.
    fn key_for(&mut self, value: &Value) -> Result<u64, ConversionError> {
        if self.index_stale {
            self.rebuild_index();
        }
        self.scratch.clear();
        self.scratch.append(value)?;
        let bytes = self.scratch_bytes();
        if let Some(key) = self.index.get(&bytes) {
            return Ok(*key);
        }
        self.dictionary.append(value)?;
        let key = (self.dictionary.rows() - 1) as u64;
        self.index.insert(bytes, key);
        Ok(key)
    }

    fn read_keys(reader: &mut dyn Read, width_code: u64, count: usize) -> Result<Vec<u64>, ChwireError> {
        let keys = match width_code {
            0 => read_typed_vec::<u8>(reader, count)?.into_iter().map(u64::from).collect(),
            1 => read_typed_vec::<u16>(reader, count)?.into_iter().map(u64::from).collect(),
            2 => read_typed_vec::<u32>(reader, count)?.into_iter().map(u64::from).collect(),
            _ => read_typed_vec::<u64>(reader, count)?,
        };
        Ok(keys)
    }
}

impl ColumnCodec for LowCardinalityColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.keys.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        if value.is_null() {
            if !self.nullable {
                return Err(reject_null(&self.descriptor));
            }
            self.keys.push(0);
            return Ok(());
        }
        let key = self
            .key_for(value)
            .map_err(|e| ConversionError { declared_type: self.descriptor.to_string(), ..e })?;
        self.keys.push(key);
        Ok(())
    }

    fn append_default(&mut self) {
        if self.nullable {
            self.keys.push(0);
            return;
        }
        if self.index_stale {
            self.rebuild_index();
        }
        self.scratch.clear();
        self.scratch.append_default();
        let bytes = self.scratch_bytes();
        let key = match self.index.get(&bytes) {
            Some(key) => *key,
            None => {
                self.dictionary.append_default();
                let key = (self.dictionary.rows() - 1) as u64;
                self.index.insert(bytes, key);
                key
            }
        };
        self.keys.push(key);
    }

    fn value(&self, row: usize) -> Value {
        let key = self.keys[row] as usize;
        if self.nullable && key == 0 {
            Value::Null
        } else {
            self.dictionary.value(key)
        }
    }

    /// Truncating to zero rows also drops the dictionary, so every flushed
    /// block starts from a fresh one.
    fn truncate(&mut self, rows: usize) {
        if rows == 0 {
            self.reset();
        } else {
            self.keys.truncate(rows);
        }
    }

    fn write_prefix(&self, buf: &mut Vec<u8>) {
        wire::write_u64(buf, KEY_SERIALIZATION_VERSION);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        // An empty nested column carries no index block at all.
        if self.keys.is_empty() {
            return;
        }
        let dictionary_rows = self.dictionary.rows();
        let width_code = key_width_code(dictionary_rows);
        wire::write_u64(buf, width_code | HAS_ADDITIONAL_KEYS | NEED_UPDATE_DICTIONARY);
        wire::write_u64(buf, dictionary_rows as u64);
        self.dictionary.write_data(buf);
        wire::write_u64(buf, self.keys.len() as u64);
        for key in &self.keys {
            match width_code {
                0 => buf.push(*key as u8),
                1 => buf.extend_from_slice(&(*key as u16).to_le_bytes()),
                2 => buf.extend_from_slice(&(*key as u32).to_le_bytes()),
                _ => buf.extend_from_slice(&key.to_le_bytes()),
            }
        }
    }

    fn read_prefix(&mut self, reader: &mut dyn Read) -> Result<(), ChwireError> {
        let version = wire::read_u64(reader)?;
        if version != KEY_SERIALIZATION_VERSION {
            return Err(corrupt(format!(
                "unsupported LowCardinality key serialization version {}",
                version
            )));
        }
        Ok(())
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        if rows == 0 {
            return Ok(());
        }
        let flags = wire::read_u64(reader)?;
        if flags & NEED_GLOBAL_DICTIONARY != 0 || flags & HAS_ADDITIONAL_KEYS == 0 {
            return Err(ChwireError::Unsupported(
                "LowCardinality blocks that rely on a global dictionary".into(),
            ));
        }
        let width_code = flags & KEY_WIDTH_MASK;
        if width_code > 3 {
            return Err(corrupt(format!("invalid LowCardinality key width code {}", width_code)));
        }

        let dictionary_rows = wire::read_u64(reader)?;
        let dictionary_rows = usize::try_from(dictionary_rows)
            .ok()
            .filter(|n| *n <= MAX_READ_ALLOCATION)
            .ok_or_else(|| corrupt(format!("dictionary of {} rows is too large", dictionary_rows)))?;
        let mut block_dictionary = new_column(&self.dictionary_type, &self.options)?;
        block_dictionary.read_data(reader, dictionary_rows)?;

        let key_count = wire::read_u64(reader)?;
        if key_count != rows as u64 {
            return Err(corrupt(format!("{} keys for a block of {} rows", key_count, rows)));
        }
        let keys = Self::read_keys(reader, width_code, rows)?;
        if let Some(bad) = keys.iter().find(|k| **k >= dictionary_rows as u64) {
            return Err(corrupt(format!(
                "key {} outside a dictionary of {} entries",
                bad, dictionary_rows
            )));
        }

        if self.keys.is_empty() {
            self.dictionary = block_dictionary;
            self.keys = keys;
            self.index_stale = true;
            return Ok(());
        }
        // Rows already held refer to the old dictionary; merge value by value.
        for key in keys {
            if self.nullable && key == 0 {
                self.keys.push(0);
                continue;
            }
            let value = block_dictionary.value(key as usize);
            let merged = self.key_for(&value).map_err(corrupt)?;
            self.keys.push(merged);
        }
        Ok(())
    }
}
