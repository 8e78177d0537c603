//! This module defines shared traits used across the fixed-width column codecs.

use num_traits::ToPrimitive;

use crate::value::Value;

/// A primitive that is stored on the wire exactly as its little-endian bytes.
pub trait NativeScalar: bytemuck::Pod + Default + PartialEq + std::fmt::Debug + Send + 'static {
    const TYPE_NAME: &'static str;

    fn into_value(self) -> Value;

    /// Converts an application value, or `None` if the kind is wrong or the
    /// value is out of range.
    fn from_value(value: &Value) -> Option<Self>;
}

// Integers accept any integer value that fits, regardless of its declared width.
macro_rules! impl_native_integer {
    ($T:ty, $variant:ident, $to:ident, $name:literal) => {
        impl NativeScalar for $T {
            const TYPE_NAME: &'static str = $name;

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: &Value) -> Option<Self> {
                match value {
                    Value::$variant(v) => Some(*v),
                    other => other.to_bigint()?.$to(),
                }
            }
        }
    };
}

impl_native_integer!(u8, UInt8, to_u8, "UInt8");
impl_native_integer!(u16, UInt16, to_u16, "UInt16");
impl_native_integer!(u32, UInt32, to_u32, "UInt32");
impl_native_integer!(u64, UInt64, to_u64, "UInt64");
impl_native_integer!(i8, Int8, to_i8, "Int8");
impl_native_integer!(i16, Int16, to_i16, "Int16");
impl_native_integer!(i32, Int32, to_i32, "Int32");
impl_native_integer!(i64, Int64, to_i64, "Int64");

impl NativeScalar for f32 {
    const TYPE_NAME: &'static str = "Float32";

    fn into_value(self) -> Value {
        Value::Float32(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float32(v) => Some(*v),
            _ => None,
        }
    }
}

impl NativeScalar for f64 {
    const TYPE_NAME: &'static str = "Float64";

    fn into_value(self) -> Value {
        Value::Float64(self)
    }

    /// `Float32` widens losslessly and is accepted.
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float64(v) => Some(*v),
            Value::Float32(v) => Some(*v as f64),
            _ => None,
        }
    }
}
