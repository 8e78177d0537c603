//! The native block: named columns sharing one row count, plus block info.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use super::format::DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION;
use crate::column::{new_column, CodecOptions, ColumnCodec};
use crate::config::ClientConfig;
use crate::error::{ChwireError, ConversionError};
use crate::types::{parse_type, TypeCache, TypeDescriptor};
use crate::utils::MAX_READ_ALLOCATION;
use crate::value::{FromRow, FromValue, Value};
use crate::wire;

//==================================================================================
// 1. Block Info
//==================================================================================

/// Per-block metadata that precedes the columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub is_overflows: bool,
    pub bucket_num: i32,
}

impl Default for BlockInfo {
    fn default() -> Self {
        Self {
            is_overflows: false,
            bucket_num: -1,
        }
    }
}

impl BlockInfo {
    pub fn write(&self, buf: &mut Vec<u8>) {
        wire::write_varint(buf, 1);
        wire::write_bool(buf, self.is_overflows);
        wire::write_varint(buf, 2);
        wire::write_i32(buf, self.bucket_num);
        wire::write_varint(buf, 0);
    }

    pub fn read(reader: &mut dyn Read) -> Result<Self, ChwireError> {
        let mut info = BlockInfo::default();
        loop {
            match wire::read_varint(reader)? {
                0 => return Ok(info),
                1 => info.is_overflows = wire::read_bool(reader)?,
                2 => info.bucket_num = wire::read_i32(reader)?,
                other => {
                    return Err(ChwireError::Protocol(format!(
                        "unknown block info field {}",
                        other
                    )))
                }
            }
        }
    }
}

//==================================================================================
// 2. The Block
//==================================================================================

#[derive(Debug)]
pub struct NamedColumn {
    pub name: String,
    pub column: Box<dyn ColumnCodec>,
}

#[derive(Debug, Default)]
pub struct Block {
    pub info: BlockInfo,
    columns: Vec<NamedColumn>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds empty columns for a list of `(name, type)` pairs.
    pub fn with_schema(
        schema: &[(String, TypeDescriptor)],
        options: &CodecOptions,
    ) -> Result<Self, ChwireError> {
        let mut block = Block::new();
        for (name, descriptor) in schema {
            block.push_column(name.clone(), new_column(descriptor, options)?)?;
        }
        Ok(block)
    }

    /// Adds a column; its row count must match the columns already present.
    pub fn push_column(
        &mut self,
        name: impl Into<String>,
        column: Box<dyn ColumnCodec>,
    ) -> Result<(), ChwireError> {
        let name = name.into();
        if let Some(first) = self.columns.first() {
            if first.column.rows() != column.rows() {
                return Err(ChwireError::Protocol(format!(
                    "column `{}` has {} rows but the block has {}",
                    name,
                    column.rows(),
                    first.column.rows()
                )));
            }
        }
        self.columns.push(NamedColumn { name, column });
        Ok(())
    }

    /// Checks that every column holds the same number of rows.
    pub fn check_row_counts(&self) -> Result<usize, ChwireError> {
        let rows = self.rows();
        for named in &self.columns {
            if named.column.rows() != rows {
                return Err(ChwireError::Protocol(format!(
                    "column `{}` has {} rows but the block has {}",
                    named.name,
                    named.column.rows(),
                    rows
                )));
            }
        }
        Ok(rows)
    }

    pub fn rows(&self) -> usize {
        self.columns.first().map(|c| c.column.rows()).unwrap_or(0)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    pub fn columns(&self) -> &[NamedColumn] {
        &self.columns
    }

    pub fn columns_mut(&mut self) -> &mut [NamedColumn] {
        &mut self.columns
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&dyn ColumnCodec> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.column.as_ref())
    }

    /// Empties every column, keeping the schema.
    pub fn clear(&mut self) {
        for named in &mut self.columns {
            named.column.clear();
        }
    }

    fn check_row(&self, index: usize) -> Result<(), ChwireError> {
        if index >= self.rows() {
            return Err(ChwireError::Protocol(format!(
                "row {} out of range for a block of {} rows",
                index,
                self.rows()
            )));
        }
        Ok(())
    }

    /// All values of row `index`, in column order.
    pub fn values(&self, index: usize) -> Result<Vec<Value>, ChwireError> {
        self.check_row(index)?;
        Ok(self.columns.iter().map(|c| c.column.value(index)).collect())
    }

    pub fn row(&self, index: usize) -> Result<RowRef<'_>, ChwireError> {
        self.check_row(index)?;
        Ok(RowRef { block: self, index })
    }

    /// Scans row `index` into `T`, e.g. a tuple with one element per column.
    pub fn scan_row<T: FromRow>(&self, index: usize) -> Result<T, ChwireError> {
        if let Some(width) = T::width() {
            if width != self.column_count() {
                return Err(ConversionError::new(
                    format!("row of {} columns", self.column_count()),
                    format!("row of {} values", width),
                    "the row type does not match the block width",
                )
                .into());
            }
        }
        let values = self.values(index)?;
        let kinds: Vec<&'static str> = values.iter().map(|v| v.kind_name()).collect();
        T::from_row(values).map_err(|(column, reason)| {
            let named = &self.columns[column];
            ChwireError::Conversion(
                ConversionError::new(named.column.descriptor(), kinds[column], reason)
                    .in_column(&named.name),
            )
        })
    }

    pub fn scan_all<T: FromRow>(&self) -> Result<Vec<T>, ChwireError> {
        (0..self.rows()).map(|i| self.scan_row(i)).collect()
    }
}

/// A borrowed view of one row, addressed by column name.
#[derive(Clone, Copy)]
pub struct RowRef<'a> {
    block: &'a Block,
    index: usize,
}

impl<'a> RowRef<'a> {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        self.block.column(name).map(|c| c.value(self.index))
    }

    pub fn get<T: FromValue>(&self, name: &str) -> Result<T, ChwireError> {
        let column = self.block.column(name).ok_or_else(|| {
            ConversionError::new("<missing>", T::target_name(), "the block has no such column")
                .in_column(name)
        })?;
        let value = column.value(self.index);
        let kind = value.kind_name();
        T::from_value(value).map_err(|reason| {
            ChwireError::Conversion(
                ConversionError::new(column.descriptor(), kind, reason).in_column(name),
            )
        })
    }
}

impl fmt::Debug for RowRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for named in self.block.columns() {
            map.entry(&named.name, &named.column.value(self.index));
        }
        map.finish()
    }
}

//==================================================================================
// 3. Wire Encoding
//==================================================================================

/// Settings for decoding blocks.
#[derive(Debug, Clone)]
pub struct BlockOptions {
    pub revision: u64,
    pub codec: CodecOptions,
    /// Shared parse results for the column type names of a stream.
    pub type_cache: Option<Arc<TypeCache>>,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            revision: super::format::CLIENT_PROTOCOL_REVISION,
            codec: CodecOptions::default(),
            type_cache: None,
        }
    }
}

impl BlockOptions {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ChwireError> {
        Ok(Self {
            revision: config.protocol_revision,
            codec: CodecOptions {
                default_timezone: config.timezone()?,
            },
            type_cache: None,
        })
    }

    pub fn with_type_cache(mut self, cache: Arc<TypeCache>) -> Self {
        self.type_cache = Some(cache);
        self
    }

    fn descriptor(&self, signature: &str) -> Result<Arc<TypeDescriptor>, ChwireError> {
        match &self.type_cache {
            Some(cache) => Ok(cache.get_or_parse(signature)?),
            None => Ok(Arc::new(parse_type(signature)?)),
        }
    }
}

/// Appends the wire form of `block` to `buf`.
pub fn encode_block(block: &Block, revision: u64, buf: &mut Vec<u8>) {
    if revision > 0 {
        block.info.write(buf);
    }
    let rows = block.rows();
    wire::write_varint(buf, block.column_count() as u64);
    wire::write_varint(buf, rows as u64);
    for named in block.columns() {
        wire::write_string(buf, named.name.as_bytes());
        wire::write_string(buf, named.column.descriptor().to_string().as_bytes());
        if revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
            wire::write_u8(buf, 0);
        }
        if rows > 0 {
            named.column.write_prefix(buf);
            named.column.write_data(buf);
        }
    }
}

/// Reads one block, building a column codec per declared type.
pub fn decode_block(reader: &mut dyn Read, options: &BlockOptions) -> Result<Block, ChwireError> {
    let mut block = Block::new();
    if options.revision > 0 {
        block.info = BlockInfo::read(reader)?;
    }
    let column_count = wire::read_varint(reader)?;
    let rows = wire::read_varint(reader)?;
    let rows = usize::try_from(rows)
        .ok()
        .filter(|r| *r <= MAX_READ_ALLOCATION)
        .ok_or_else(|| ChwireError::Protocol(format!("block claims {} rows", rows)))?;

    for _ in 0..column_count {
        let name = wire::read_string(reader)?;
        let signature = wire::read_string(reader)?;
        let descriptor = options.descriptor(&signature)?;
        if options.revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
            let custom = wire::read_u8(reader)?;
            if custom != 0 {
                return Err(ChwireError::Unsupported(format!(
                    "custom serialization of column `{}`",
                    name
                )));
            }
        }
        let mut column = new_column(&descriptor, &options.codec)?;
        if rows > 0 {
            column.read_prefix(reader).map_err(|e| e.in_column(&name))?;
            column
                .read_data(reader, rows)
                .map_err(|e| e.in_column(&name))?;
        }
        block.columns.push(NamedColumn { name, column });
    }
    log::trace!("decoded block of {} columns x {} rows", column_count, rows);
    Ok(block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_type;
    use std::io::Cursor;

    fn sample_block() -> Block {
        let schema = vec![
            ("id".to_string(), parse_type("UInt32").unwrap()),
            ("name".to_string(), parse_type("Nullable(String)").unwrap()),
        ];
        let mut block = Block::with_schema(&schema, &CodecOptions::default()).unwrap();
        for (i, name) in [(1u32, Some("a")), (2, None)] {
            let columns = block.columns_mut();
            columns[0].column.append(&Value::UInt32(i)).unwrap();
            columns[1].column.append(&Value::from(name)).unwrap();
        }
        block
    }

    #[test]
    fn test_block_wire_layout() {
        let block = sample_block();
        let mut buf = Vec::new();
        encode_block(&block, 54460, &mut buf);

        let mut expected = vec![1, 0, 2, 0xff, 0xff, 0xff, 0xff, 0, 2, 2];
        expected.extend_from_slice(b"\x02id\x06UInt32\x00");
        expected.extend_from_slice(&[1, 0, 0, 0, 2, 0, 0, 0]);
        expected.extend_from_slice(b"\x04name\x10Nullable(String)\x00");
        expected.extend_from_slice(&[0, 1, 1, b'a', 0]);
        assert_eq!(buf, expected);
    }

    #[test]
    fn test_revision_zero_has_no_info_or_flags() {
        let block = sample_block();
        let mut buf = Vec::new();
        encode_block(&block, 0, &mut buf);
        assert_eq!(&buf[..5], b"\x02\x02\x02id");

        let options = BlockOptions { revision: 0, ..BlockOptions::default() };
        let decoded = decode_block(&mut Cursor::new(buf), &options).unwrap();
        assert_eq!(decoded.rows(), 2);
    }

    #[test]
    fn test_decode_and_scan() {
        let mut buf = Vec::new();
        encode_block(&sample_block(), 54460, &mut buf);
        let cache = Arc::new(TypeCache::new());
        let options = BlockOptions::default().with_type_cache(cache.clone());
        let block = decode_block(&mut Cursor::new(buf), &options).unwrap();

        assert_eq!(block.info, BlockInfo::default());
        assert_eq!(cache.len(), 2);
        let rows: Vec<(u32, Option<String>)> = block.scan_all().unwrap();
        assert_eq!(rows, vec![(1, Some("a".to_string())), (2, None)]);
        assert_eq!(block.row(1).unwrap().get::<u64>("id").unwrap(), 2);
        assert!(block.row(1).unwrap().get::<String>("name").is_err());
        assert!(block.row(2).is_err());
    }

    #[test]
    fn test_scan_errors_name_the_column() {
        let block = sample_block();
        let err = block.scan_row::<(u32, u8)>(0).unwrap_err();
        match err {
            ChwireError::Conversion(e) => {
                assert_eq!(e.column, "name");
                assert_eq!(e.declared_type, "Nullable(String)");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(block.scan_row::<(u32,)>(0).is_err());
    }

    #[test]
    fn test_zero_row_block_has_no_column_data() {
        let schema = vec![("x".to_string(), parse_type("LowCardinality(String)").unwrap())];
        let block = Block::with_schema(&schema, &CodecOptions::default()).unwrap();
        let mut buf = Vec::new();
        encode_block(&block, 54460, &mut buf);
        assert_eq!(buf.len(), 8 + 2 + 1 + 1 + 1 + 22 + 1);
        let decoded = decode_block(&mut Cursor::new(buf), &BlockOptions::default()).unwrap();
        assert_eq!(decoded.column_count(), 1);
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_truncated_column_names_the_column() {
        let mut buf = Vec::new();
        encode_block(&sample_block(), 54460, &mut buf);
        buf.truncate(buf.len() - 2);
        let err = decode_block(&mut Cursor::new(buf), &BlockOptions::default()).unwrap_err();
        assert!(matches!(err, ChwireError::CorruptBlock { ref column, .. } if column == "name"));
    }

    #[test]
    fn test_push_column_checks_row_counts() {
        let mut block = sample_block();
        let empty = new_column(&parse_type("UInt8").unwrap(), &CodecOptions::default()).unwrap();
        assert!(block.push_column("late", empty).is_err());
    }
}
