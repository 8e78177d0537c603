//! This module defines the dynamic value representation exchanged between the
//! application and the column codecs.
//!
//! `Value` is deliberately a closed enum: every codec matches on it directly
//! and typed Rust values enter through `From` impls and leave through
//! `FromValue` (see `convert`).

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use chrono_tz::Tz;
use num_bigint::{BigInt, Sign};
use num_traits::{Signed, Zero};
use uuid::Uuid;

pub mod convert;

pub use convert::{FromRow, FromValue, Record};

//==================================================================================
// 1. The Value Enum
//==================================================================================

/// A single cell value, as appended to or decoded from a column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    /// 128- and 256-bit integers, signed or unsigned.
    BigInt(BigInt),
    Float32(f32),
    Float64(f64),
    Decimal(Decimal),
    /// Text columns decode to `String` when the bytes are valid UTF-8.
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    /// Both `Date` and `Date32`.
    Date(NaiveDate),
    /// Both `DateTime` and `DateTime64`; the precision lives on the column.
    DateTime(DateTime<Tz>),
    Array(Vec<Value>),
    /// Entries in insertion (wire) order.
    Map(Vec<(Value, Value)>),
    Tuple(Vec<Value>),
    Json(serde_json::Value),
}

impl Value {
    /// A short name of the value's dynamic type, used in conversion errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "Bool",
            Value::UInt8(_) => "UInt8",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::BigInt(_) => "BigInt",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::Decimal(_) => "Decimal",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Uuid(_) => "UUID",
            Value::Ipv4(_) => "IPv4",
            Value::Ipv6(_) => "IPv6",
            Value::Date(_) => "Date",
            Value::DateTime(_) => "DateTime",
            Value::Array(_) => "Array",
            Value::Map(_) => "Map",
            Value::Tuple(_) => "Tuple",
            Value::Json(_) => "JSON",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Any integer value widened to a `BigInt`; `None` for non-integers.
    pub fn to_bigint(&self) -> Option<BigInt> {
        match self {
            Value::UInt8(v) => Some(BigInt::from(*v)),
            Value::UInt16(v) => Some(BigInt::from(*v)),
            Value::UInt32(v) => Some(BigInt::from(*v)),
            Value::UInt64(v) => Some(BigInt::from(*v)),
            Value::Int8(v) => Some(BigInt::from(*v)),
            Value::Int16(v) => Some(BigInt::from(*v)),
            Value::Int32(v) => Some(BigInt::from(*v)),
            Value::Int64(v) => Some(BigInt::from(*v)),
            Value::BigInt(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// The raw bytes of a text-like value.
    pub fn as_text_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b.as_slice()),
            _ => None,
        }
    }

    /// Builds a text value, keeping invalid UTF-8 as raw bytes.
    pub fn from_text_bytes(bytes: Vec<u8>) -> Value {
        match String::from_utf8(bytes) {
            Ok(s) => Value::String(s),
            Err(e) => Value::Bytes(e.into_bytes()),
        }
    }
}

//==================================================================================
// 2. Exact Decimal Representation
//==================================================================================

/// A fixed-point decimal: `mantissa * 10^-scale`, never a float.
///
/// Equality is structural, so `1.50` (scale 2) and `1.5` (scale 1) differ;
/// decoded values always carry the column's declared scale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    mantissa: BigInt,
    scale: u32,
}

impl Decimal {
    pub fn new(mantissa: impl Into<BigInt>, scale: u32) -> Self {
        Self {
            mantissa: mantissa.into(),
            scale,
        }
    }

    pub fn mantissa(&self) -> &BigInt {
        &self.mantissa
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// The same value at another scale, or `None` if digits would be lost.
    pub fn rescale(&self, scale: u32) -> Option<Decimal> {
        if scale >= self.scale {
            let factor = pow10(scale - self.scale);
            return Some(Decimal::new(&self.mantissa * factor, scale));
        }
        let factor = pow10(self.scale - scale);
        if !(&self.mantissa % &factor).is_zero() {
            return None;
        }
        Some(Decimal::new(&self.mantissa / factor, scale))
    }

    /// The number of decimal digits in the mantissa (zero has one digit).
    pub fn digits(&self) -> usize {
        let text = self.mantissa.abs().to_string();
        text.len()
    }
}

/// `10^exp` as a `BigInt`.
pub(crate) fn pow10(exp: u32) -> BigInt {
    num_traits::pow(BigInt::from(10u8), exp as usize)
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.mantissa.abs().to_string();
        let sign = if self.mantissa.sign() == Sign::Minus { "-" } else { "" };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{}{}", sign, digits);
        }
        let padded = format!("{:0>width$}", digits, width = scale + 1);
        let (int_part, frac_part) = padded.split_at(padded.len() - scale);
        write!(f, "{}{}.{}", sign, int_part, frac_part)
    }
}

impl FromStr for Decimal {
    type Err = String;

    /// Parses `[-+]digits[.digits]`; the scale is the number of fraction digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (negative, unsigned) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let (int_part, frac_part) = match unsigned.split_once('.') {
            Some((i, f)) => (i, f),
            None => (unsigned, ""),
        };
        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty()) || !all_digits(int_part) || !all_digits(frac_part)
        {
            return Err(format!("'{}' is not a decimal number", s));
        }
        let joined = format!("{}{}", int_part, frac_part);
        let mut mantissa: BigInt = joined
            .parse()
            .map_err(|_| format!("'{}' is not a decimal number", s))?;
        if negative {
            mantissa = -mantissa;
        }
        Ok(Decimal::new(mantissa, frac_part.len() as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_display_pads_fraction() {
        assert_eq!(Decimal::new(12345, 2).to_string(), "123.45");
        assert_eq!(Decimal::new(-5, 3).to_string(), "-0.005");
        assert_eq!(Decimal::new(7, 0).to_string(), "7");
    }

    #[test]
    fn test_decimal_parse_roundtrip() {
        let d: Decimal = "-0012.34500".parse().unwrap();
        assert_eq!(d, Decimal::new(-1234500, 5));
        assert_eq!(d.to_string(), "-12.34500");
        assert!("1.2.3".parse::<Decimal>().is_err());
        assert!("".parse::<Decimal>().is_err());
    }

    #[test]
    fn test_decimal_rescale_is_exact() {
        let d = Decimal::new(150, 2);
        assert_eq!(d.rescale(4), Some(Decimal::new(15000, 4)));
        assert_eq!(d.rescale(1), Some(Decimal::new(15, 1)));
        assert_eq!(Decimal::new(151, 2).rescale(1), None);
    }

    #[test]
    fn test_decimal_digits() {
        assert_eq!(Decimal::new(0, 0).digits(), 1);
        assert_eq!(Decimal::new(-999_999_999_999_999_999i64, 5).digits(), 18);
    }

    #[test]
    fn test_text_bytes_fallback() {
        assert_eq!(Value::from_text_bytes(b"abc".to_vec()), Value::String("abc".into()));
        assert_eq!(Value::from_text_bytes(vec![0xff, 0xfe]), Value::Bytes(vec![0xff, 0xfe]));
    }
}
