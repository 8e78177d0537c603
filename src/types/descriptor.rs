//! This module defines the canonical, type-safe representation of column types
//! used throughout the chwire codec.

use std::fmt;

use crate::value::Value;

//==================================================================================
// 1. Leaf Kinds
//==================================================================================

/// Fixed-shape leaf types. Each kind knows its wire width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ScalarKind {
    Bool,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    UInt256,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Int256,
    Float32,
    Float64,
    BFloat16,
    String,
    Uuid,
    Ipv4,
    Ipv6,
    Date,
    Date32,
    Nothing,
}

impl ScalarKind {
    /// Bytes per row on the wire; `None` for variable-length `String`.
    pub fn width(&self) -> Option<usize> {
        use ScalarKind::*;
        match self {
            Bool | UInt8 | Int8 | Nothing => Some(1),
            UInt16 | Int16 | Date | BFloat16 => Some(2),
            UInt32 | Int32 | Float32 | Ipv4 | Date32 => Some(4),
            UInt64 | Int64 | Float64 => Some(8),
            UInt128 | Int128 | Uuid | Ipv6 => Some(16),
            UInt256 | Int256 => Some(32),
            String => None,
        }
    }

    pub fn name(&self) -> &'static str {
        use ScalarKind::*;
        match self {
            Bool => "Bool",
            UInt8 => "UInt8",
            UInt16 => "UInt16",
            UInt32 => "UInt32",
            UInt64 => "UInt64",
            UInt128 => "UInt128",
            UInt256 => "UInt256",
            Int8 => "Int8",
            Int16 => "Int16",
            Int32 => "Int32",
            Int64 => "Int64",
            Int128 => "Int128",
            Int256 => "Int256",
            Float32 => "Float32",
            Float64 => "Float64",
            BFloat16 => "BFloat16",
            String => "String",
            Uuid => "UUID",
            Ipv4 => "IPv4",
            Ipv6 => "IPv6",
            Date => "Date",
            Date32 => "Date32",
            Nothing => "Nothing",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        use ScalarKind::*;
        let kind = match name {
            "Bool" | "Boolean" => Bool,
            "UInt8" => UInt8,
            "UInt16" => UInt16,
            "UInt32" => UInt32,
            "UInt64" => UInt64,
            "UInt128" => UInt128,
            "UInt256" => UInt256,
            "Int8" => Int8,
            "Int16" => Int16,
            "Int32" => Int32,
            "Int64" => Int64,
            "Int128" => Int128,
            "Int256" => Int256,
            "Float32" => Float32,
            "Float64" => Float64,
            "BFloat16" => BFloat16,
            "String" => String,
            "UUID" => Uuid,
            "IPv4" => Ipv4,
            "IPv6" => Ipv6,
            "Date" => Date,
            "Date32" => Date32,
            "Nothing" => Nothing,
            _ => return None,
        };
        Some(kind)
    }
}

/// The geo aliases; each is structurally an array/tuple of `Float64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeoKind {
    Point,
    Ring,
    LineString,
    Polygon,
    MultiLineString,
    MultiPolygon,
}

impl GeoKind {
    pub fn name(&self) -> &'static str {
        match self {
            GeoKind::Point => "Point",
            GeoKind::Ring => "Ring",
            GeoKind::LineString => "LineString",
            GeoKind::Polygon => "Polygon",
            GeoKind::MultiLineString => "MultiLineString",
            GeoKind::MultiPolygon => "MultiPolygon",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "Point" => GeoKind::Point,
            "Ring" => GeoKind::Ring,
            "LineString" => GeoKind::LineString,
            "Polygon" => GeoKind::Polygon,
            "MultiLineString" => GeoKind::MultiLineString,
            "MultiPolygon" => GeoKind::MultiPolygon,
            _ => return None,
        };
        Some(kind)
    }

    /// The structural type the alias is encoded as.
    pub fn storage(&self) -> TypeDescriptor {
        let point = || TypeDescriptor::Geo(GeoKind::Point);
        let array = |inner: TypeDescriptor| TypeDescriptor::Array(Box::new(inner));
        match self {
            GeoKind::Point => TypeDescriptor::Tuple(vec![
                TupleElement::positional(TypeDescriptor::Scalar(ScalarKind::Float64)),
                TupleElement::positional(TypeDescriptor::Scalar(ScalarKind::Float64)),
            ]),
            GeoKind::Ring | GeoKind::LineString => array(point()),
            GeoKind::Polygon => array(TypeDescriptor::Geo(GeoKind::Ring)),
            GeoKind::MultiLineString => array(TypeDescriptor::Geo(GeoKind::LineString)),
            GeoKind::MultiPolygon => array(TypeDescriptor::Geo(GeoKind::Polygon)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumWidth {
    Enum8,
    Enum16,
}

/// One element of a `Tuple`; `name` is `None` for positional tuples.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TupleElement {
    pub name: Option<String>,
    pub ty: TypeDescriptor,
}

impl TupleElement {
    pub fn positional(ty: TypeDescriptor) -> Self {
        Self { name: None, ty }
    }

    pub fn named(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }
}

//==================================================================================
// 2. The Descriptor Tree
//==================================================================================

/// An immutable, structurally comparable column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Scalar(ScalarKind),
    FixedString(usize),
    Decimal { precision: u8, scale: u8 },
    /// `precision: None` is `DateTime`, `Some(p)` is `DateTime64(p)`.
    DateTime {
        precision: Option<u8>,
        timezone: Option<String>,
    },
    Nullable(Box<TypeDescriptor>),
    Array(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Tuple(Vec<TupleElement>),
    LowCardinality(Box<TypeDescriptor>),
    Enum {
        width: EnumWidth,
        variants: Vec<(String, i16)>,
    },
    /// Alternatives sorted by canonical name; the index is the discriminant.
    Variant(Vec<TypeDescriptor>),
    Dynamic { max_types: Option<u32> },
    /// `arguments` keeps the raw `JSON(...)` argument text, if any.
    Json { arguments: Option<String> },
    Geo(GeoKind),
    QBit { element: ScalarKind, dimension: u32 },
}

impl TypeDescriptor {
    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeDescriptor::Nullable(_))
    }

    /// The descriptor with one `Nullable` layer removed, if present.
    pub fn strip_nullable(&self) -> &TypeDescriptor {
        match self {
            TypeDescriptor::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Whether `Nullable(self)` is a legal type.
    pub fn can_be_inside_nullable(&self) -> bool {
        !matches!(
            self,
            TypeDescriptor::Nullable(_)
                | TypeDescriptor::Array(_)
                | TypeDescriptor::Map(..)
                | TypeDescriptor::Tuple(_)
                | TypeDescriptor::LowCardinality(_)
                | TypeDescriptor::Variant(_)
                | TypeDescriptor::Dynamic { .. }
                | TypeDescriptor::Json { .. }
                | TypeDescriptor::Geo(_)
                | TypeDescriptor::QBit { .. }
        )
    }

    /// Whether `LowCardinality(self)` is a legal type.
    pub fn can_be_inside_low_cardinality(&self) -> bool {
        match self {
            TypeDescriptor::Nullable(inner) => inner.can_be_inside_low_cardinality(),
            TypeDescriptor::Scalar(kind) => !matches!(kind, ScalarKind::Nothing),
            TypeDescriptor::FixedString(_) | TypeDescriptor::DateTime { precision: None, .. } => {
                true
            }
            _ => false,
        }
    }

    /// Structural check used to pick a `Variant` alternative for a value. It
    /// only looks at the value's kind, not at its range.
    pub fn matches_value(&self, value: &Value) -> bool {
        use ScalarKind as K;
        match (self, value) {
            (TypeDescriptor::Nullable(_), Value::Null) => true,
            (TypeDescriptor::Nullable(inner), v) => inner.matches_value(v),
            (TypeDescriptor::LowCardinality(inner), v) => inner.matches_value(v),
            (TypeDescriptor::Scalar(kind), v) => matches!(
                (kind, v),
                (K::Bool, Value::Bool(_))
                    | (K::UInt8, Value::UInt8(_))
                    | (K::UInt16, Value::UInt16(_))
                    | (K::UInt32, Value::UInt32(_))
                    | (K::UInt64, Value::UInt64(_))
                    | (K::Int8, Value::Int8(_))
                    | (K::Int16, Value::Int16(_))
                    | (K::Int32, Value::Int32(_))
                    | (K::Int64, Value::Int64(_))
                    | (K::UInt128 | K::UInt256 | K::Int128 | K::Int256, Value::BigInt(_))
                    | (K::Float32 | K::BFloat16, Value::Float32(_))
                    | (K::Float64, Value::Float64(_))
                    | (K::String, Value::String(_) | Value::Bytes(_))
                    | (K::Uuid, Value::Uuid(_))
                    | (K::Ipv4, Value::Ipv4(_))
                    | (K::Ipv6, Value::Ipv6(_))
                    | (K::Date | K::Date32, Value::Date(_))
            ),
            (TypeDescriptor::FixedString(_), Value::String(_) | Value::Bytes(_)) => true,
            (TypeDescriptor::Decimal { .. }, Value::Decimal(_)) => true,
            (TypeDescriptor::DateTime { .. }, Value::DateTime(_)) => true,
            (TypeDescriptor::Enum { variants, .. }, Value::String(label)) => {
                variants.iter().any(|(l, _)| l == label)
            }
            (TypeDescriptor::Array(inner), Value::Array(items)) => {
                items.iter().all(|item| inner.matches_value(item))
            }
            (TypeDescriptor::Map(..), Value::Map(_)) => true,
            (TypeDescriptor::Tuple(elements), Value::Tuple(items)) => {
                elements.len() == items.len()
                    && elements.iter().zip(items).all(|(e, v)| e.ty.matches_value(v))
            }
            (TypeDescriptor::Json { .. }, Value::Json(_)) => true,
            (TypeDescriptor::Geo(kind), v) => kind.storage().matches_value(v),
            (TypeDescriptor::QBit { .. }, Value::Array(_)) => true,
            _ => false,
        }
    }

    /// The descriptor a `Dynamic` column stores a value under.
    pub fn infer_from_value(value: &Value) -> Option<TypeDescriptor> {
        use ScalarKind as K;
        let scalar = |k| Some(TypeDescriptor::Scalar(k));
        match value {
            Value::Null => None,
            Value::Bool(_) => scalar(K::Bool),
            Value::UInt8(_) => scalar(K::UInt8),
            Value::UInt16(_) => scalar(K::UInt16),
            Value::UInt32(_) => scalar(K::UInt32),
            Value::UInt64(_) => scalar(K::UInt64),
            Value::Int8(_) => scalar(K::Int8),
            Value::Int16(_) => scalar(K::Int16),
            Value::Int32(_) => scalar(K::Int32),
            Value::Int64(_) => scalar(K::Int64),
            Value::BigInt(v) => {
                let bits = v.bits();
                let negative = v.sign() == num_bigint::Sign::Minus;
                match (negative, bits) {
                    (false, 0..=128) => scalar(K::UInt128),
                    (true, 0..=127) => scalar(K::Int128),
                    (false, _) => scalar(K::UInt256),
                    (true, _) => scalar(K::Int256),
                }
            }
            Value::Float32(_) => scalar(K::Float32),
            Value::Float64(_) => scalar(K::Float64),
            Value::Decimal(d) => {
                let precision = match d.digits().max(d.scale() as usize) {
                    0..=9 => 9,
                    10..=18 => 18,
                    19..=38 => 38,
                    _ => 76,
                };
                Some(TypeDescriptor::Decimal {
                    precision,
                    scale: d.scale().min(precision as u32) as u8,
                })
            }
            Value::String(_) | Value::Bytes(_) => scalar(K::String),
            Value::Uuid(_) => scalar(K::Uuid),
            Value::Ipv4(_) => scalar(K::Ipv4),
            Value::Ipv6(_) => scalar(K::Ipv6),
            Value::Date(_) => scalar(K::Date32),
            Value::DateTime(dt) => {
                use chrono::Timelike;
                let timezone = Some(dt.timezone().name().to_string());
                let precision = if dt.nanosecond() == 0 { None } else { Some(9) };
                Some(TypeDescriptor::DateTime { precision, timezone })
            }
            Value::Array(items) => {
                let inner = infer_element(items.iter())?;
                Some(TypeDescriptor::Array(Box::new(inner)))
            }
            Value::Map(entries) => {
                let key = infer_element(entries.iter().map(|(k, _)| k))?;
                let value = infer_element(entries.iter().map(|(_, v)| v))?;
                Some(TypeDescriptor::Map(Box::new(key), Box::new(value)))
            }
            Value::Tuple(items) => {
                let elements = items
                    .iter()
                    .map(|item| {
                        let ty = TypeDescriptor::infer_from_value(item)
                            .map(|t| wrap_nullable(t, item.is_null()))
                            .unwrap_or_else(nullable_nothing);
                        Some(TupleElement::positional(ty))
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(TypeDescriptor::Tuple(elements))
            }
            Value::Json(_) => Some(TypeDescriptor::Json { arguments: None }),
        }
    }
}

fn nullable_nothing() -> TypeDescriptor {
    TypeDescriptor::Nullable(Box::new(TypeDescriptor::Scalar(ScalarKind::Nothing)))
}

fn wrap_nullable(ty: TypeDescriptor, wrap: bool) -> TypeDescriptor {
    if wrap && ty.can_be_inside_nullable() {
        TypeDescriptor::Nullable(Box::new(ty))
    } else {
        ty
    }
}

/// Element type of a collection: the first non-null element decides, and any
/// null promotes it to `Nullable` where legal.
fn infer_element<'a>(items: impl Iterator<Item = &'a Value>) -> Option<TypeDescriptor> {
    let mut has_null = false;
    let mut inferred = None;
    for item in items {
        if item.is_null() {
            has_null = true;
        } else if inferred.is_none() {
            inferred = TypeDescriptor::infer_from_value(item);
        }
    }
    match inferred {
        Some(ty) => Some(wrap_nullable(ty, has_null)),
        None if has_null => Some(nullable_nothing()),
        None => Some(TypeDescriptor::Scalar(ScalarKind::Nothing)),
    }
}

//==================================================================================
// 3. Canonical Textual Form
//==================================================================================

/// Quotes a string literal the way the server prints it.
fn quote_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('\'');
    for c in raw.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

fn needs_backquotes(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return true,
    }
    !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_list<T>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    mut each: impl FnMut(&mut fmt::Formatter<'_>, &T) -> fmt::Result,
) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        each(f, item)?;
    }
    Ok(())
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Scalar(kind) => f.write_str(kind.name()),
            TypeDescriptor::FixedString(n) => write!(f, "FixedString({})", n),
            TypeDescriptor::Decimal { precision, scale } => {
                write!(f, "Decimal({}, {})", precision, scale)
            }
            TypeDescriptor::DateTime {
                precision: None,
                timezone,
            } => match timezone {
                Some(tz) => write!(f, "DateTime({})", quote_literal(tz)),
                None => f.write_str("DateTime"),
            },
            TypeDescriptor::DateTime {
                precision: Some(p),
                timezone,
            } => match timezone {
                Some(tz) => write!(f, "DateTime64({}, {})", p, quote_literal(tz)),
                None => write!(f, "DateTime64({})", p),
            },
            TypeDescriptor::Nullable(inner) => write!(f, "Nullable({})", inner),
            TypeDescriptor::Array(inner) => write!(f, "Array({})", inner),
            TypeDescriptor::Map(key, value) => write!(f, "Map({}, {})", key, value),
            TypeDescriptor::Tuple(elements) => {
                f.write_str("Tuple(")?;
                write_list(f, elements, |f, e| match &e.name {
                    Some(name) if needs_backquotes(name) => write!(f, "`{}` {}", name, e.ty),
                    Some(name) => write!(f, "{} {}", name, e.ty),
                    None => write!(f, "{}", e.ty),
                })?;
                f.write_str(")")
            }
            TypeDescriptor::LowCardinality(inner) => write!(f, "LowCardinality({})", inner),
            TypeDescriptor::Enum { width, variants } => {
                let name = match width {
                    EnumWidth::Enum8 => "Enum8",
                    EnumWidth::Enum16 => "Enum16",
                };
                write!(f, "{}(", name)?;
                write_list(f, variants, |f, (label, ord)| {
                    write!(f, "{} = {}", quote_literal(label), ord)
                })?;
                f.write_str(")")
            }
            TypeDescriptor::Variant(alternatives) => {
                f.write_str("Variant(")?;
                write_list(f, alternatives, |f, t| write!(f, "{}", t))?;
                f.write_str(")")
            }
            TypeDescriptor::Dynamic { max_types } => match max_types {
                Some(n) => write!(f, "Dynamic(max_types={})", n),
                None => f.write_str("Dynamic"),
            },
            TypeDescriptor::Json { arguments } => match arguments {
                Some(args) => write!(f, "JSON({})", args),
                None => f.write_str("JSON"),
            },
            TypeDescriptor::Geo(kind) => f.write_str(kind.name()),
            TypeDescriptor::QBit { element, dimension } => {
                write!(f, "QBit({}, {})", element.name(), dimension)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_widths() {
        assert_eq!(ScalarKind::Int256.width(), Some(32));
        assert_eq!(ScalarKind::Date.width(), Some(2));
        assert_eq!(ScalarKind::String.width(), None);
    }

    #[test]
    fn test_display_nested() {
        let ty = TypeDescriptor::Array(Box::new(TypeDescriptor::Nullable(Box::new(
            TypeDescriptor::Decimal {
                precision: 18,
                scale: 5,
            },
        ))));
        assert_eq!(ty.to_string(), "Array(Nullable(Decimal(18, 5)))");
    }

    #[test]
    fn test_display_enum_escapes_quotes() {
        let ty = TypeDescriptor::Enum {
            width: EnumWidth::Enum8,
            variants: vec![("it's".into(), 1), ("b\\".into(), -2)],
        };
        assert_eq!(ty.to_string(), r"Enum8('it\'s' = 1, 'b\\' = -2)");
    }

    #[test]
    fn test_display_named_tuple_backquotes() {
        let ty = TypeDescriptor::Tuple(vec![
            TupleElement::named("a", TypeDescriptor::Scalar(ScalarKind::UInt8)),
            TupleElement::named("my col", TypeDescriptor::Scalar(ScalarKind::String)),
        ]);
        assert_eq!(ty.to_string(), "Tuple(a UInt8, `my col` String)");
    }

    #[test]
    fn test_geo_storage_shapes() {
        assert_eq!(GeoKind::Point.storage().to_string(), "Tuple(Float64, Float64)");
        assert_eq!(GeoKind::Polygon.storage().to_string(), "Array(Ring)");
    }

    #[test]
    fn test_infer_collections() {
        let value = Value::Array(vec![Value::Null, Value::Int32(1)]);
        let ty = TypeDescriptor::infer_from_value(&value).unwrap();
        assert_eq!(ty.to_string(), "Array(Nullable(Int32))");
        let empty = TypeDescriptor::infer_from_value(&Value::Array(vec![])).unwrap();
        assert_eq!(empty.to_string(), "Array(Nothing)");
    }

    #[test]
    fn test_matches_value_is_kind_based() {
        let ty = TypeDescriptor::Scalar(ScalarKind::UInt8);
        assert!(ty.matches_value(&Value::UInt8(1)));
        assert!(!ty.matches_value(&Value::UInt16(1)));
        assert!(!ty.matches_value(&Value::String("1".into())));
    }
}
