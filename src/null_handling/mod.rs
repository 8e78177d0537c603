//! This module contains the null-map helpers shared by `Nullable(T)` and the
//! other codecs that track per-row nullness.
//!
//! On the wire a null map is one byte per row, 1 for NULL and 0 otherwise,
//! written before the nested column. The nested column always carries a
//! (default) value at every NULL position.

use std::io::Read;

use crate::error::ChwireError;
use crate::utils::read_bytes;

/// Reads a null map of `rows` bytes, rejecting anything but 0 and 1.
pub fn read_null_map(reader: &mut dyn Read, rows: usize) -> Result<Vec<u8>, ChwireError> {
    let map = read_bytes(reader, rows)?;
    if let Some(pos) = map.iter().position(|b| *b > 1) {
        return Err(ChwireError::corrupt_block(
            "",
            format!("null map byte {} at row {} is not 0 or 1", map[pos], pos),
        ));
    }
    Ok(map)
}

pub fn write_null_map(buf: &mut Vec<u8>, map: &[u8]) {
    buf.extend_from_slice(map);
}

#[cfg(test)]
mod tests;
