//! A recursive-descent parser for textual column type signatures such as
//! `Array(Nullable(Decimal(18, 5)))` or `Tuple(id UInt64, tags Map(String, String))`.
//!
//! Parsing is pure: the same signature always yields the same descriptor, and
//! the `Display` form of any descriptor parses back to an equal one.

use std::str::FromStr;

use chrono_tz::Tz;

use super::descriptor::{EnumWidth, GeoKind, ScalarKind, TupleElement, TypeDescriptor};
use crate::error::ParseError;

/// Deeper nesting than this is rejected instead of risking the stack.
const MAX_NESTING_DEPTH: usize = 64;

/// Parses a complete type signature.
pub fn parse_type(signature: &str) -> Result<TypeDescriptor, ParseError> {
    let mut parser = Parser::new(signature);
    parser.skip_ws();
    let ty = parser.parse_type(0)?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("unexpected trailing characters"));
    }
    Ok(ty)
}

impl FromStr for TypeDescriptor {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_type(s)
    }
}

//==================================================================================
// 1. Cursor Primitives
//==================================================================================

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        let src = self.src;
        &src[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.src.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn error(&self, reason: impl Into<String>) -> ParseError {
        ParseError {
            signature: self.src.to_string(),
            fragment: self.rest().to_string(),
            reason: reason.into(),
        }
    }

    /// Consumes `c` after optional whitespace.
    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), ParseError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", c)))
        }
    }

    fn ident(&mut self) -> Result<&'a str, ParseError> {
        self.skip_ws();
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        if self.pos == start {
            return Err(self.error("expected a type name"));
        }
        let src = self.src;
        Ok(&src[start..self.pos])
    }

    fn integer(&mut self) -> Result<i64, ParseError> {
        self.skip_ws();
        let start = self.pos;
        if matches!(self.peek(), Some('-') | Some('+')) {
            self.bump();
        }
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.bump();
        }
        let src = self.src;
        match src[start..self.pos].parse::<i64>() {
            Ok(value) => Ok(value),
            Err(_) => {
                self.pos = start;
                Err(self.error("expected an integer"))
            }
        }
    }

    fn unsigned<T: TryFrom<i64>>(&mut self, what: &str) -> Result<T, ParseError> {
        let start = self.pos;
        let value = self.integer()?;
        T::try_from(value).map_err(|_| {
            self.pos = start;
            self.error(format!("{} {} is out of range", what, value))
        })
    }

    /// A single-quoted literal with `\'` and `\\` escapes.
    fn string_literal(&mut self) -> Result<String, ParseError> {
        self.skip_ws();
        if self.peek() != Some('\'') {
            return Err(self.error("expected a quoted string"));
        }
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('\'') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('0') => out.push('\0'),
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated string literal")),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated string literal")),
            }
        }
    }

    /// A column name inside a named tuple, optionally back-quoted.
    fn element_name(&mut self) -> Result<String, ParseError> {
        self.skip_ws();
        if self.peek() != Some('`') {
            return Ok(self.ident()?.to_string());
        }
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('`') => return Ok(out),
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(self.error("unterminated quoted name")),
                },
                Some(c) => out.push(c),
                None => return Err(self.error("unterminated quoted name")),
            }
        }
    }

    /// Everything up to the parenthesis that closes the one just consumed.
    fn raw_arguments(&mut self) -> Result<&'a str, ParseError> {
        let start = self.pos;
        let mut depth = 1usize;
        let mut quote: Option<char> = None;
        while let Some(c) = self.bump() {
            match (quote, c) {
                (Some(_), '\\') => {
                    self.bump();
                }
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '`' | '"') => quote = Some(c),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth == 0 {
                        let src = self.src;
                        return Ok(src[start..self.pos - 1].trim());
                    }
                }
                _ => {}
            }
        }
        Err(self.error("unbalanced parentheses"))
    }

    //==============================================================================
    // 2. Grammar
    //==============================================================================

    fn parse_type(&mut self, depth: usize) -> Result<TypeDescriptor, ParseError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(self.error("type nesting is too deep"));
        }
        self.skip_ws();
        let start = self.pos;
        let name = self.ident()?;
        let has_args = self.eat('(');

        let ty = match name {
            "Nullable" => {
                let inner = self.single_argument(has_args, depth)?;
                if !inner.can_be_inside_nullable() {
                    self.pos = start;
                    return Err(self.error(format!("Nullable cannot wrap {}", inner)));
                }
                TypeDescriptor::Nullable(Box::new(inner))
            }
            "Array" => TypeDescriptor::Array(Box::new(self.single_argument(has_args, depth)?)),
            "LowCardinality" => {
                let inner = self.single_argument(has_args, depth)?;
                if !inner.can_be_inside_low_cardinality() {
                    self.pos = start;
                    return Err(self.error(format!("LowCardinality cannot wrap {}", inner)));
                }
                TypeDescriptor::LowCardinality(Box::new(inner))
            }
            "Map" => {
                self.require_args(has_args, name)?;
                let key = self.parse_type(depth + 1)?;
                self.expect(',')?;
                let value = self.parse_type(depth + 1)?;
                self.expect(')')?;
                TypeDescriptor::Map(Box::new(key), Box::new(value))
            }
            "Tuple" => {
                self.require_args(has_args, name)?;
                self.tuple_elements(depth)?
            }
            "Variant" => {
                self.require_args(has_args, name)?;
                self.variant_alternatives(depth)?
            }
            "SimpleAggregateFunction" => {
                self.require_args(has_args, name)?;
                self.ident()?;
                self.expect(',')?;
                let inner = self.parse_type(depth + 1)?;
                self.expect(')')?;
                inner
            }
            "FixedString" => {
                self.require_args(has_args, name)?;
                let n: usize = self.unsigned("FixedString length")?;
                if n == 0 {
                    return Err(self.error("FixedString length must be positive"));
                }
                self.expect(')')?;
                TypeDescriptor::FixedString(n)
            }
            "Decimal" => {
                self.require_args(has_args, name)?;
                let precision: u8 = self.unsigned("Decimal precision")?;
                let scale: u8 = if self.eat(',') { self.unsigned("Decimal scale")? } else { 0 };
                self.expect(')')?;
                self.decimal(precision, scale)?
            }
            "Decimal32" | "Decimal64" | "Decimal128" | "Decimal256" => {
                self.require_args(has_args, name)?;
                let precision = match name {
                    "Decimal32" => 9,
                    "Decimal64" => 18,
                    "Decimal128" => 38,
                    _ => 76,
                };
                let scale: u8 = self.unsigned("Decimal scale")?;
                self.expect(')')?;
                self.decimal(precision, scale)?
            }
            "DateTime" => {
                let timezone = if has_args {
                    let tz = self.timezone()?;
                    self.expect(')')?;
                    Some(tz)
                } else {
                    None
                };
                TypeDescriptor::DateTime {
                    precision: None,
                    timezone,
                }
            }
            "DateTime64" => {
                self.require_args(has_args, name)?;
                let precision: u8 = self.unsigned("DateTime64 precision")?;
                if precision > 9 {
                    return Err(self.error("DateTime64 precision must be between 0 and 9"));
                }
                let timezone = if self.eat(',') { Some(self.timezone()?) } else { None };
                self.expect(')')?;
                TypeDescriptor::DateTime {
                    precision: Some(precision),
                    timezone,
                }
            }
            "Enum8" | "Enum16" | "Enum" => {
                self.require_args(has_args, name)?;
                let width = match name {
                    "Enum8" => Some(EnumWidth::Enum8),
                    "Enum16" => Some(EnumWidth::Enum16),
                    _ => None,
                };
                self.enum_body(width)?
            }
            "Dynamic" => {
                let max_types = if has_args {
                    let key = self.ident()?;
                    if key != "max_types" {
                        return Err(self.error(format!("unknown Dynamic parameter '{}'", key)));
                    }
                    self.expect('=')?;
                    let n: u32 = self.unsigned("max_types")?;
                    if n > 254 {
                        return Err(self.error("max_types must not exceed 254"));
                    }
                    self.expect(')')?;
                    Some(n)
                } else {
                    None
                };
                TypeDescriptor::Dynamic { max_types }
            }
            "JSON" => {
                let arguments = if has_args {
                    let raw = self.raw_arguments()?;
                    (!raw.is_empty()).then(|| raw.to_string())
                } else {
                    None
                };
                TypeDescriptor::Json { arguments }
            }
            "QBit" => {
                self.require_args(has_args, name)?;
                let element_start = self.pos;
                let element = self.ident()?;
                let element = match ScalarKind::from_name(element) {
                    Some(k @ (ScalarKind::BFloat16 | ScalarKind::Float32 | ScalarKind::Float64)) => k,
                    _ => {
                        self.pos = element_start;
                        return Err(self.error("QBit element must be BFloat16, Float32 or Float64"));
                    }
                };
                self.expect(',')?;
                let dimension: u32 = self.unsigned("QBit dimension")?;
                if dimension == 0 {
                    return Err(self.error("QBit dimension must be positive"));
                }
                self.expect(')')?;
                TypeDescriptor::QBit { element, dimension }
            }
            other => {
                let ty = if let Some(kind) = ScalarKind::from_name(other) {
                    TypeDescriptor::Scalar(kind)
                } else if let Some(geo) = GeoKind::from_name(other) {
                    TypeDescriptor::Geo(geo)
                } else {
                    self.pos = start;
                    self.skip_ws();
                    return Err(self.error(format!("unknown type '{}'", other)));
                };
                if has_args {
                    return Err(self.error(format!("{} takes no arguments", other)));
                }
                ty
            }
        };
        Ok(ty)
    }

    fn require_args(&self, has_args: bool, name: &str) -> Result<(), ParseError> {
        if has_args {
            Ok(())
        } else {
            Err(self.error(format!("{} requires arguments", name)))
        }
    }

    fn single_argument(&mut self, has_args: bool, depth: usize) -> Result<TypeDescriptor, ParseError> {
        if !has_args {
            return Err(self.error("expected '('"));
        }
        let inner = self.parse_type(depth + 1)?;
        self.expect(')')?;
        Ok(inner)
    }

    fn decimal(&self, precision: u8, scale: u8) -> Result<TypeDescriptor, ParseError> {
        if !(1..=76).contains(&precision) {
            return Err(self.error("Decimal precision must be between 1 and 76"));
        }
        if scale > precision {
            return Err(self.error("Decimal scale must not exceed its precision"));
        }
        Ok(TypeDescriptor::Decimal { precision, scale })
    }

    fn timezone(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        let name = self.string_literal()?;
        if Tz::from_str(&name).is_err() {
            self.pos = start;
            self.skip_ws();
            return Err(self.error(format!("unknown timezone '{}'", name)));
        }
        Ok(name)
    }

    fn tuple_elements(&mut self, depth: usize) -> Result<TypeDescriptor, ParseError> {
        let mut elements = Vec::new();
        loop {
            elements.push(self.tuple_element(depth)?);
            if self.eat(')') {
                break;
            }
            self.expect(',')?;
        }
        let named = elements.iter().filter(|e| e.name.is_some()).count();
        if named != 0 && named != elements.len() {
            return Err(self.error("tuple elements must be either all named or all positional"));
        }
        Ok(TypeDescriptor::Tuple(elements))
    }

    fn tuple_element(&mut self, depth: usize) -> Result<TupleElement, ParseError> {
        self.skip_ws();
        if self.peek() == Some('`') {
            let name = self.element_name()?;
            return Ok(TupleElement::named(name, self.parse_type(depth + 1)?));
        }
        // `name Type` is told apart from `Type` by a second identifier.
        let checkpoint = self.pos;
        let first = self.ident()?;
        self.skip_ws();
        match self.peek() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let name = first.to_string();
                Ok(TupleElement::named(name, self.parse_type(depth + 1)?))
            }
            _ => {
                self.pos = checkpoint;
                Ok(TupleElement::positional(self.parse_type(depth + 1)?))
            }
        }
    }

    fn variant_alternatives(&mut self, depth: usize) -> Result<TypeDescriptor, ParseError> {
        let mut alternatives = Vec::new();
        loop {
            let start = self.pos;
            let alternative = self.parse_type(depth + 1)?;
            if alternative.is_nullable() {
                self.pos = start;
                self.skip_ws();
                return Err(self.error("Variant alternatives cannot be Nullable"));
            }
            alternatives.push(alternative);
            if self.eat(')') {
                break;
            }
            self.expect(',')?;
        }
        // Discriminants follow the order of canonical names.
        let mut keyed: Vec<(String, TypeDescriptor)> =
            alternatives.into_iter().map(|t| (t.to_string(), t)).collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        if keyed.windows(2).any(|w| w[0].0 == w[1].0) {
            return Err(self.error("Variant alternatives must be distinct"));
        }
        if keyed.len() > 255 {
            return Err(self.error("Variant supports at most 255 alternatives"));
        }
        Ok(TypeDescriptor::Variant(keyed.into_iter().map(|(_, t)| t).collect()))
    }

    fn enum_body(&mut self, width: Option<EnumWidth>) -> Result<TypeDescriptor, ParseError> {
        let mut entries: Vec<(String, Option<i64>)> = Vec::new();
        loop {
            let label = self.string_literal()?;
            let ordinal = if self.eat('=') { Some(self.integer()?) } else { None };
            entries.push((label, ordinal));
            if self.eat(')') {
                break;
            }
            self.expect(',')?;
        }

        let explicit = entries.iter().filter(|(_, o)| o.is_some()).count();
        if explicit != 0 && explicit != entries.len() {
            return Err(self.error("enum values must be either all numbered or all unnumbered"));
        }
        let numbered: Vec<(String, i64)> = entries
            .into_iter()
            .enumerate()
            .map(|(i, (label, ordinal))| (label, ordinal.unwrap_or(i as i64 + 1)))
            .collect();

        let fits_i8 = numbered.iter().all(|(_, o)| i8::try_from(*o).is_ok());
        let width = match width {
            Some(w) => w,
            None if fits_i8 => EnumWidth::Enum8,
            None => EnumWidth::Enum16,
        };
        let mut variants = Vec::with_capacity(numbered.len());
        for (label, ordinal) in numbered {
            let in_range = match width {
                EnumWidth::Enum8 => i8::try_from(ordinal).is_ok(),
                EnumWidth::Enum16 => i16::try_from(ordinal).is_ok(),
            };
            if !in_range {
                return Err(self.error(format!("enum value {} is out of range", ordinal)));
            }
            variants.push((label, ordinal as i16));
        }

        for (i, (label, ordinal)) in variants.iter().enumerate() {
            if variants[..i].iter().any(|(l, o)| l == label || o == ordinal) {
                return Err(self.error(format!("duplicate enum entry '{}' = {}", label, ordinal)));
            }
        }
        Ok(TypeDescriptor::Enum { width, variants })
    }
}
