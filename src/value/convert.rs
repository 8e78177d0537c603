//! Conversions between typed Rust values and `Value`.
//!
//! - `From<T> for Value` carries application values into the codecs.
//! - `FromValue` carries decoded values back out, failing with a reason string
//!   that the caller wraps into a `ConversionError` with column context.
//! - `FromRow` scans a whole row into a tuple.
//! - `Record` is the struct-to-row adapter used by `Batch::append_struct`.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use uuid::Uuid;

use super::{Decimal, Value};

//==================================================================================
// 1. Into Value
//==================================================================================

macro_rules! impl_from_native {
    ($($native:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$native> for Value {
                fn from(v: $native) -> Self {
                    Value::$variant(v)
                }
            }
        )+
    };
}

impl_from_native!(
    bool => Bool,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
    BigInt => BigInt,
    Decimal => Decimal,
    String => String,
    Uuid => Uuid,
    Ipv4Addr => Ipv4,
    Ipv6Addr => Ipv6,
    NaiveDate => Date,
    DateTime<Tz> => DateTime,
    serde_json::Value => Json,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<u128> for Value {
    fn from(v: u128) -> Self {
        Value::BigInt(BigInt::from(v))
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        Value::BigInt(BigInt::from(v))
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v.with_timezone(&Tz::UTC))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<Value>, V: Into<Value>> From<HashMap<K, V>> for Value {
    fn from(v: HashMap<K, V>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<Value>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(v: BTreeMap<K, V>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

macro_rules! impl_from_tuple {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> From<($($name,)+)> for Value {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                Value::Tuple(vec![$($name.into()),+])
            }
        }
    };
}

impl_from_tuple!(A, B);
impl_from_tuple!(A, B, C);
impl_from_tuple!(A, B, C, D);
impl_from_tuple!(A, B, C, D, E);

//==================================================================================
// 2. Out of Value
//==================================================================================

/// Extracts a typed Rust value from a decoded `Value`.
pub trait FromValue: Sized {
    /// The Rust-side type name reported in conversion errors.
    fn target_name() -> &'static str;

    fn from_value(value: Value) -> Result<Self, String>;
}

fn mismatch<T: FromValue>(value: &Value) -> String {
    format!("cannot scan {} into {}", value.kind_name(), T::target_name())
}

impl FromValue for Value {
    fn target_name() -> &'static str {
        "Value"
    }

    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

macro_rules! impl_from_value_int {
    ($($native:ty => $to:ident),+ $(,)?) => {
        $(
            impl FromValue for $native {
                fn target_name() -> &'static str {
                    stringify!($native)
                }

                fn from_value(value: Value) -> Result<Self, String> {
                    let wide = value.to_bigint().ok_or_else(|| mismatch::<Self>(&value))?;
                    wide.$to().ok_or_else(|| {
                        format!("{} does not fit into {}", wide, stringify!($native))
                    })
                }
            }
        )+
    };
}

impl_from_value_int!(
    u8 => to_u8,
    u16 => to_u16,
    u32 => to_u32,
    u64 => to_u64,
    u128 => to_u128,
    i8 => to_i8,
    i16 => to_i16,
    i32 => to_i32,
    i64 => to_i64,
    i128 => to_i128,
);

impl FromValue for f32 {
    fn target_name() -> &'static str {
        "f32"
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Float32(v) => Ok(v),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromValue for f64 {
    fn target_name() -> &'static str {
        "f64"
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Float64(v) => Ok(v),
            Value::Float32(v) => Ok(v as f64),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromValue for bool {
    fn target_name() -> &'static str {
        "bool"
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Bool(v) => Ok(v),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromValue for String {
    fn target_name() -> &'static str {
        "String"
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::String(v) => Ok(v),
            Value::Bytes(b) => {
                String::from_utf8(b).map_err(|_| "bytes are not valid UTF-8".to_string())
            }
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromValue for BigInt {
    fn target_name() -> &'static str {
        "BigInt"
    }

    fn from_value(value: Value) -> Result<Self, String> {
        value.to_bigint().ok_or_else(|| mismatch::<Self>(&value))
    }
}

macro_rules! impl_from_value_exact {
    ($($native:ty => $variant:ident),+ $(,)?) => {
        $(
            impl FromValue for $native {
                fn target_name() -> &'static str {
                    stringify!($native)
                }

                fn from_value(value: Value) -> Result<Self, String> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(mismatch::<Self>(&other)),
                    }
                }
            }
        )+
    };
}

impl_from_value_exact!(
    Decimal => Decimal,
    Uuid => Uuid,
    Ipv4Addr => Ipv4,
    Ipv6Addr => Ipv6,
    NaiveDate => Date,
    serde_json::Value => Json,
);

impl FromValue for DateTime<Tz> {
    fn target_name() -> &'static str {
        "DateTime<Tz>"
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::DateTime(v) => Ok(v),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn target_name() -> &'static str {
        "DateTime<Utc>"
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::DateTime(v) => Ok(v.with_timezone(&Utc)),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn target_name() -> &'static str {
        T::target_name()
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn target_name() -> &'static str {
        "Vec"
    }

    /// Arrays scan element-wise; maps scan as a list of `(key, value)` tuples.
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| T::from_value(Value::Tuple(vec![k, v])))
                .collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl<K: FromValue + Eq + Hash, V: FromValue> FromValue for HashMap<K, V> {
    fn target_name() -> &'static str {
        "HashMap"
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

macro_rules! impl_from_value_tuple {
    ($len:expr; $($name:ident),+) => {
        impl<$($name: FromValue),+> FromValue for ($($name,)+) {
            fn target_name() -> &'static str {
                "tuple"
            }

            #[allow(non_snake_case)]
            fn from_value(value: Value) -> Result<Self, String> {
                match value {
                    Value::Tuple(items) if items.len() == $len => {
                        let mut iter = items.into_iter();
                        $(
                            let $name = $name::from_value(
                                iter.next().ok_or_else(|| "tuple too short".to_string())?,
                            )?;
                        )+
                        Ok(($($name,)+))
                    }
                    Value::Tuple(items) => Err(format!(
                        "cannot scan a {}-element tuple into a {}-element tuple",
                        items.len(),
                        $len
                    )),
                    other => Err(mismatch::<Self>(&other)),
                }
            }
        }
    };
}

impl_from_value_tuple!(2; A, B);
impl_from_value_tuple!(3; A, B, C);
impl_from_value_tuple!(4; A, B, C, D);
impl_from_value_tuple!(5; A, B, C, D, E);

//==================================================================================
// 3. Rows and Records
//==================================================================================

/// Scans one block row (all columns, in order) into a Rust value.
pub trait FromRow: Sized {
    /// The number of columns the row type expects; `None` accepts any width.
    fn width() -> Option<usize>;

    /// Converts the row cell by cell. On failure, returns the index of the
    /// offending column with the reason.
    fn from_row(values: Vec<Value>) -> Result<Self, (usize, String)>;
}

impl FromRow for Vec<Value> {
    fn width() -> Option<usize> {
        None
    }

    fn from_row(values: Vec<Value>) -> Result<Self, (usize, String)> {
        Ok(values)
    }
}

macro_rules! impl_from_row_tuple {
    ($len:expr; $($idx:tt => $name:ident),+) => {
        impl<$($name: FromValue),+> FromRow for ($($name,)+) {
            fn width() -> Option<usize> {
                Some($len)
            }

            #[allow(non_snake_case)]
            fn from_row(values: Vec<Value>) -> Result<Self, (usize, String)> {
                let mut iter = values.into_iter();
                $(
                    let $name = $name::from_value(
                        iter.next().ok_or(($idx, "row too short".to_string()))?,
                    )
                    .map_err(|e| ($idx, e))?;
                )+
                Ok(($($name,)+))
            }
        }
    };
}

impl_from_row_tuple!(1; 0 => A);
impl_from_row_tuple!(2; 0 => A, 1 => B);
impl_from_row_tuple!(3; 0 => A, 1 => B, 2 => C);
impl_from_row_tuple!(4; 0 => A, 1 => B, 2 => C, 3 => D);
impl_from_row_tuple!(5; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E);
impl_from_row_tuple!(6; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F);
impl_from_row_tuple!(7; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F, 6 => G);
impl_from_row_tuple!(8; 0 => A, 1 => B, 2 => C, 3 => D, 4 => E, 5 => F, 6 => G, 7 => H);

/// A structured record that can be inserted as one row.
///
/// Implement it by hand or with `impl_record!`, which maps each struct field
/// to a column name.
pub trait Record {
    /// `(column name, value)` pairs in field declaration order.
    fn into_fields(self) -> Vec<(&'static str, Value)>;
}

/// Implements `Record` for a struct by listing `field => "column"` pairs.
///
/// ```
/// struct Event { id: u64, label: String }
/// chwire::impl_record!(Event { id => "event_id", label => "label" });
/// ```
#[macro_export]
macro_rules! impl_record {
    ($ty:ty { $($field:ident => $column:literal),+ $(,)? }) => {
        impl $crate::value::Record for $ty {
            fn into_fields(self) -> Vec<(&'static str, $crate::value::Value)> {
                vec![$(($column, $crate::value::Value::from(self.$field))),+]
            }
        }
    };
}
