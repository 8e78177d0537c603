//! This module is the public entry point for the column codecs.
//!
//! Every `TypeDescriptor` variant has one codec. A codec owns the typed
//! buffer of one column: values enter through `append`, leave through
//! `value`, and cross the wire through the prefix/data pairs. The block
//! assembler writes all prefixes of a column before its data, which is what
//! the server expects for nested types such as `Array(LowCardinality(String))`.

use std::fmt::Debug;
use std::io::Read;

use chrono_tz::Tz;

use crate::error::{ChwireError, ConversionError};
use crate::types::{ScalarKind, TypeDescriptor};
use crate::value::Value;

//==================================================================================
// 1. Module Declarations
//==================================================================================

mod array;
mod bigint;
mod decimal;
mod dynamic;
mod enums;
mod geo;
mod json;
mod low_cardinality;
mod map;
mod misc;
mod nullable;
mod numeric;
mod qbit;
mod string;
mod temporal;
mod tuple;
mod variant;


//==================================================================================
// 2. The Codec Contract
//==================================================================================

/// Options that influence how columns interpret values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodecOptions {
    /// Attached to `DateTime` values whose column declares no timezone.
    pub default_timezone: Tz,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            default_timezone: Tz::UTC,
        }
    }
}

/// One column's typed buffer plus its wire encoding.
///
/// `append` either adds exactly one row or leaves the column unchanged.
/// `value` must only be called with `row < rows()`.
pub trait ColumnCodec: Send + Debug {
    fn descriptor(&self) -> &TypeDescriptor;

    fn rows(&self) -> usize;

    fn append(&mut self, value: &Value) -> Result<(), ConversionError>;

    /// Appends the type's zero value (empty string, 0, epoch, empty array, ...).
    fn append_default(&mut self);

    fn value(&self, row: usize) -> Value;

    /// Drops every row from `rows` on.
    fn truncate(&mut self, rows: usize);

    fn clear(&mut self) {
        self.truncate(0);
    }

    /// Per-block state written before the data of the column (and before the
    /// data of any nested column).
    fn write_prefix(&self, _buf: &mut Vec<u8>) {}

    fn write_data(&self, buf: &mut Vec<u8>);

    fn read_prefix(&mut self, _reader: &mut dyn Read) -> Result<(), ChwireError> {
        Ok(())
    }

    /// Reads `rows` rows, appending them after any rows already held.
    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError>;
}

//==================================================================================
// 3. The Factory
//==================================================================================

/// Builds the empty codec for a descriptor.
pub fn new_column(
    descriptor: &TypeDescriptor,
    options: &CodecOptions,
) -> Result<Box<dyn ColumnCodec>, ChwireError> {
    let codec: Box<dyn ColumnCodec> = match descriptor {
        TypeDescriptor::Scalar(kind) => scalar_column(*kind),
        TypeDescriptor::FixedString(n) => Box::new(string::FixedStringColumn::new(*n)),
        TypeDescriptor::Decimal { precision, scale } => {
            Box::new(decimal::DecimalColumn::new(*precision, *scale))
        }
        TypeDescriptor::DateTime { precision, timezone } => {
            let tz = match timezone {
                Some(name) => name.parse::<Tz>().map_err(|e| {
                    ChwireError::Unsupported(format!("unknown timezone '{}': {}", name, e))
                })?,
                None => options.default_timezone,
            };
            Box::new(temporal::DateTimeColumn::new(descriptor.clone(), *precision, tz))
        }
        TypeDescriptor::Nullable(inner) => {
            Box::new(nullable::NullableColumn::new(descriptor.clone(), new_column(inner, options)?))
        }
        TypeDescriptor::Array(inner) => {
            Box::new(array::ArrayColumn::new(descriptor.clone(), new_column(inner, options)?))
        }
        TypeDescriptor::Map(key, value) => Box::new(map::MapColumn::new(
            descriptor.clone(),
            new_column(key, options)?,
            new_column(value, options)?,
        )),
        TypeDescriptor::Tuple(elements) => {
            let columns = elements
                .iter()
                .map(|e| new_column(&e.ty, options))
                .collect::<Result<Vec<_>, _>>()?;
            Box::new(tuple::TupleColumn::new(descriptor.clone(), columns))
        }
        TypeDescriptor::LowCardinality(inner) => Box::new(
            low_cardinality::LowCardinalityColumn::new(descriptor.clone(), inner, options)?,
        ),
        TypeDescriptor::Enum { width, variants } => {
            Box::new(enums::EnumColumn::new(descriptor.clone(), *width, variants.clone()))
        }
        TypeDescriptor::Variant(alternatives) => {
            let columns = alternatives
                .iter()
                .map(|t| new_column(t, options))
                .collect::<Result<Vec<_>, _>>()?;
            Box::new(variant::VariantColumn::new(descriptor.clone(), columns))
        }
        TypeDescriptor::Dynamic { max_types } => {
            Box::new(dynamic::DynamicColumn::new(descriptor.clone(), *max_types, *options))
        }
        TypeDescriptor::Json { .. } => Box::new(json::JsonColumn::new(descriptor.clone())),
        TypeDescriptor::Geo(kind) => Box::new(geo::GeoColumn::new(
            descriptor.clone(),
            new_column(&kind.storage(), options)?,
        )),
        TypeDescriptor::QBit { element, dimension } => {
            Box::new(qbit::QBitColumn::new(descriptor.clone(), *element, *dimension)?)
        }
    };
    Ok(codec)
}

fn scalar_column(kind: ScalarKind) -> Box<dyn ColumnCodec> {
    use numeric::NumericColumn;
    use ScalarKind as K;
    match kind {
        K::Bool => Box::new(misc::BoolColumn::new()),
        K::UInt8 => Box::new(NumericColumn::<u8>::new(kind)),
        K::UInt16 => Box::new(NumericColumn::<u16>::new(kind)),
        K::UInt32 => Box::new(NumericColumn::<u32>::new(kind)),
        K::UInt64 => Box::new(NumericColumn::<u64>::new(kind)),
        K::Int8 => Box::new(NumericColumn::<i8>::new(kind)),
        K::Int16 => Box::new(NumericColumn::<i16>::new(kind)),
        K::Int32 => Box::new(NumericColumn::<i32>::new(kind)),
        K::Int64 => Box::new(NumericColumn::<i64>::new(kind)),
        K::Float32 => Box::new(NumericColumn::<f32>::new(kind)),
        K::Float64 => Box::new(NumericColumn::<f64>::new(kind)),
        K::BFloat16 => Box::new(numeric::BFloat16Column::new()),
        K::UInt128 | K::UInt256 | K::Int128 | K::Int256 => {
            Box::new(bigint::WideIntColumn::new(kind))
        }
        K::String => Box::new(string::StringColumn::new()),
        K::Uuid => Box::new(misc::UuidColumn::new()),
        K::Ipv4 => Box::new(misc::Ipv4Column::new()),
        K::Ipv6 => Box::new(misc::Ipv6Column::new()),
        K::Date => Box::new(temporal::DateColumn::new(false)),
        K::Date32 => Box::new(temporal::DateColumn::new(true)),
        K::Nothing => Box::new(misc::NothingColumn::new()),
    }
}

//==================================================================================
// 4. Shared Helpers
//==================================================================================

/// A conversion error for `value` against the column's declared type.
pub(crate) fn mismatch(
    descriptor: &TypeDescriptor,
    value: &Value,
    reason: impl Into<String>,
) -> ConversionError {
    ConversionError::new(descriptor, value.kind_name(), reason)
}

/// The standard rejection of `NULL` by a non-nullable column.
pub(crate) fn reject_null(descriptor: &TypeDescriptor) -> ConversionError {
    ConversionError::new(
        descriptor,
        "NULL",
        "NULL is not allowed in a non-nullable column",
    )
}

/// A read-side corruption whose column name is filled in by the block decoder.
pub(crate) fn corrupt(reason: impl std::fmt::Display) -> ChwireError {
    ChwireError::corrupt_block("", reason)
}
