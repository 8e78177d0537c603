//! Small fixed-width columns: `Bool`, `UUID`, `IPv4`, `IPv6` and `Nothing`.

use std::io::Read;
use std::net::{Ipv4Addr, Ipv6Addr};

use uuid::Uuid;

use super::{corrupt, mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::{ScalarKind, TypeDescriptor};
use crate::utils::{checked_len, read_bytes, read_typed_vec, typed_slice_to_bytes};
use crate::value::Value;

/// Implements the boilerplate half of `ColumnCodec` over a `values` vector.
macro_rules! impl_vec_storage {
    () => {
        fn descriptor(&self) -> &TypeDescriptor {
            &self.descriptor
        }

        fn rows(&self) -> usize {
            self.values.len()
        }

        fn truncate(&mut self, rows: usize) {
            self.values.truncate(rows);
        }
    };
}

//==================================================================================
// 1. Bool
//==================================================================================

#[derive(Debug)]
pub struct BoolColumn {
    descriptor: TypeDescriptor,
    values: Vec<u8>,
}

impl BoolColumn {
    pub fn new() -> Self {
        Self {
            descriptor: TypeDescriptor::Scalar(ScalarKind::Bool),
            values: Vec::new(),
        }
    }
}

impl ColumnCodec for BoolColumn {
    impl_vec_storage!();

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        match value {
            Value::Bool(b) => {
                self.values.push(*b as u8);
                Ok(())
            }
            Value::Null => Err(reject_null(&self.descriptor)),
            other => Err(mismatch(&self.descriptor, other, "expected a boolean value")),
        }
    }

    fn append_default(&mut self) {
        self.values.push(0);
    }

    fn value(&self, row: usize) -> Value {
        Value::Bool(self.values[row] != 0)
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.values);
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        self.values.extend(read_bytes(reader, rows)?);
        Ok(())
    }
}

//==================================================================================
// 2. UUID
//==================================================================================

/// Stored as two little-endian u64 halves, high half first.
#[derive(Debug)]
pub struct UuidColumn {
    descriptor: TypeDescriptor,
    values: Vec<Uuid>,
}

impl UuidColumn {
    pub fn new() -> Self {
        Self {
            descriptor: TypeDescriptor::Scalar(ScalarKind::Uuid),
            values: Vec::new(),
        }
    }
}

impl ColumnCodec for UuidColumn {
    impl_vec_storage!();

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let uuid = match value {
            Value::Uuid(u) => *u,
            Value::String(s) => Uuid::parse_str(s).map_err(|e| {
                mismatch(&self.descriptor, value, format!("invalid UUID text: {}", e))
            })?,
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => return Err(mismatch(&self.descriptor, other, "expected a UUID value")),
        };
        self.values.push(uuid);
        Ok(())
    }

    fn append_default(&mut self) {
        self.values.push(Uuid::nil());
    }

    fn value(&self, row: usize) -> Value {
        Value::Uuid(self.values[row])
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        for uuid in &self.values {
            let (high, low) = uuid.as_u64_pair();
            buf.extend_from_slice(&high.to_le_bytes());
            buf.extend_from_slice(&low.to_le_bytes());
        }
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let halves = read_typed_vec::<u64>(reader, rows.saturating_mul(2))?;
        self.values
            .extend(halves.chunks_exact(2).map(|pair| Uuid::from_u64_pair(pair[0], pair[1])));
        Ok(())
    }
}

//==================================================================================
// 3. IPv4 / IPv6
//==================================================================================

/// IPv4 is its numeric value as a little-endian u32.
#[derive(Debug)]
pub struct Ipv4Column {
    descriptor: TypeDescriptor,
    values: Vec<u32>,
}

impl Ipv4Column {
    pub fn new() -> Self {
        Self {
            descriptor: TypeDescriptor::Scalar(ScalarKind::Ipv4),
            values: Vec::new(),
        }
    }
}

impl ColumnCodec for Ipv4Column {
    impl_vec_storage!();

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let addr = match value {
            Value::Ipv4(a) => *a,
            Value::String(s) => s.parse::<Ipv4Addr>().map_err(|e| {
                mismatch(&self.descriptor, value, format!("invalid IPv4 text: {}", e))
            })?,
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => return Err(mismatch(&self.descriptor, other, "expected an IPv4 address")),
        };
        self.values.push(u32::from(addr));
        Ok(())
    }

    fn append_default(&mut self) {
        self.values.push(0);
    }

    fn value(&self, row: usize) -> Value {
        Value::Ipv4(Ipv4Addr::from(self.values[row]))
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(typed_slice_to_bytes(&self.values));
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        self.values.extend(read_typed_vec::<u32>(reader, rows)?);
        Ok(())
    }
}

/// IPv6 is its sixteen octets in network order.
#[derive(Debug)]
pub struct Ipv6Column {
    descriptor: TypeDescriptor,
    values: Vec<[u8; 16]>,
}

impl Ipv6Column {
    pub fn new() -> Self {
        Self {
            descriptor: TypeDescriptor::Scalar(ScalarKind::Ipv6),
            values: Vec::new(),
        }
    }
}

impl ColumnCodec for Ipv6Column {
    impl_vec_storage!();

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let addr = match value {
            Value::Ipv6(a) => *a,
            Value::Ipv4(a) => a.to_ipv6_mapped(),
            Value::String(s) => s.parse::<Ipv6Addr>().map_err(|e| {
                mismatch(&self.descriptor, value, format!("invalid IPv6 text: {}", e))
            })?,
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => return Err(mismatch(&self.descriptor, other, "expected an IPv6 address")),
        };
        self.values.push(addr.octets());
        Ok(())
    }

    fn append_default(&mut self) {
        self.values.push([0; 16]);
    }

    fn value(&self, row: usize) -> Value {
        Value::Ipv6(Ipv6Addr::from(self.values[row]))
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        for octets in &self.values {
            buf.extend_from_slice(octets);
        }
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let bytes = read_bytes(reader, checked_len(rows, 16)?)?;
        for chunk in bytes.chunks_exact(16) {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(chunk);
            self.values.push(octets);
        }
        Ok(())
    }
}

//==================================================================================
// 4. Nothing
//==================================================================================

/// Holds no values; each row is a single zero byte on the wire.
#[derive(Debug)]
pub struct NothingColumn {
    descriptor: TypeDescriptor,
    rows: usize,
}

impl NothingColumn {
    pub fn new() -> Self {
        Self {
            descriptor: TypeDescriptor::Scalar(ScalarKind::Nothing),
            rows: 0,
        }
    }
}

impl ColumnCodec for NothingColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.rows
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        Err(mismatch(&self.descriptor, value, "a Nothing column cannot hold values"))
    }

    fn append_default(&mut self) {
        self.rows += 1;
    }

    fn value(&self, _row: usize) -> Value {
        Value::Null
    }

    fn truncate(&mut self, rows: usize) {
        self.rows = self.rows.min(rows);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        buf.resize(buf.len() + self.rows, 0);
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        let bytes = read_bytes(reader, rows)?;
        if bytes.iter().any(|b| *b != 0) {
            return Err(corrupt("non-zero byte in a Nothing column"));
        }
        self.rows += rows;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_uuid_half_order() {
        let uuid = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        let mut col = UuidColumn::new();
        col.append(&Value::Uuid(uuid)).unwrap();
        let mut buf = Vec::new();
        col.write_data(&mut buf);
        assert_eq!(&buf[..8], &[0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11, 0x00]);
        assert_eq!(&buf[8..], &[0xff, 0xee, 0xdd, 0xcc, 0xbb, 0xaa, 0x99, 0x88]);

        let mut decoded = UuidColumn::new();
        decoded.read_data(&mut Cursor::new(buf), 1).unwrap();
        assert_eq!(decoded.value(0), Value::Uuid(uuid));
    }

    #[test]
    fn test_ip_encodings() {
        let mut v4 = Ipv4Column::new();
        v4.append(&Value::String("1.2.3.4".into())).unwrap();
        let mut buf = Vec::new();
        v4.write_data(&mut buf);
        assert_eq!(buf, vec![4, 3, 2, 1]);

        let mut v6 = Ipv6Column::new();
        v6.append(&Value::Ipv6("::1".parse().unwrap())).unwrap();
        let mut buf = Vec::new();
        v6.write_data(&mut buf);
        assert_eq!(buf[15], 1);
        assert!(buf[..15].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_bool_and_nothing() {
        let mut b = BoolColumn::new();
        b.append(&Value::Bool(true)).unwrap();
        assert!(b.append(&Value::UInt8(1)).is_err());
        assert_eq!(b.value(0), Value::Bool(true));

        let mut nothing = NothingColumn::new();
        assert!(nothing.append(&Value::Null).is_err());
        nothing.append_default();
        nothing.append_default();
        let mut buf = Vec::new();
        nothing.write_data(&mut buf);
        assert_eq!(buf, vec![0, 0]);
        assert!(NothingColumn::new().read_data(&mut Cursor::new(vec![1u8]), 1).is_err());
    }
}
