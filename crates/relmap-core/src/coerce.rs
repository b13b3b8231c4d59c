//! The value coercion matrix.
//!
//! Every member carries exactly one [`CoercionRule`], fixed when its
//! descriptor is built. Rules are checked in declaration order of the enum:
//! a converter beats an enum mode, which beats the boolean, narrowing and
//! text rules, and anything left over passes through unchanged.

use crate::descriptor::MetadataDescriptor;
use crate::entity::{Converter, EnumMode, MemberDef, MemberType};
use crate::error::{ConfigError, Error, Result};
use crate::types::SqlType;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;

/// Integer width targeted by decimal narrowing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    I8,
    I16,
    I32,
    I64,
    /// Big integer (`i128`)
    I128,
}

impl IntWidth {
    fn of(member_type: MemberType) -> Option<Self> {
        match member_type {
            MemberType::Int8 => Some(IntWidth::I8),
            MemberType::Int16 => Some(IntWidth::I16),
            MemberType::Int32 => Some(IntWidth::I32),
            MemberType::Int64 => Some(IntWidth::I64),
            MemberType::BigInteger => Some(IntWidth::I128),
            _ => None,
        }
    }

    fn narrow(self, whole: i128) -> Option<Value> {
        match self {
            IntWidth::I8 => i8::try_from(whole).ok().map(Value::TinyInt),
            IntWidth::I16 => i16::try_from(whole).ok().map(Value::SmallInt),
            IntWidth::I32 => i32::try_from(whole).ok().map(Value::Int),
            IntWidth::I64 => i64::try_from(whole).ok().map(Value::BigInt),
            IntWidth::I128 => Some(Value::from(whole)),
        }
    }

    const fn label(self) -> &'static str {
        match self {
            IntWidth::I8 => "i8",
            IntWidth::I16 => "i16",
            IntWidth::I32 => "i32",
            IntWidth::I64 => "i64",
            IntWidth::I128 => "i128",
        }
    }
}

/// One entry of the closed coercion rule list.
#[derive(Clone)]
pub enum CoercionRule {
    /// A registered converter owns both directions
    Converter(Arc<dyn Converter>),
    /// Enum stored as its zero-based ordinal
    EnumOrdinal(&'static [&'static str]),
    /// Enum stored as its case-sensitive symbolic name
    EnumName(&'static [&'static str]),
    /// Boolean member backed by an integer column
    BoolAsInt,
    /// Integer member fed by decimal or floating columns, truncated toward zero
    DecimalNarrowing(IntWidth),
    /// Text member fed by character data delivered as raw bytes
    TextStream,
    Identity,
}

impl CoercionRule {
    /// Pick the rule for a member. Instantiates its converter, if any.
    #[allow(clippy::result_large_err)]
    pub(crate) fn select<E: 'static>(entity: &'static str, def: &MemberDef<E>) -> Result<Self> {
        if let Some(factory) = def.converter {
            let converter = factory().map_err(|e| {
                Error::Config(ConfigError {
                    message: format!(
                        "converter for {}.{} could not be instantiated: {}",
                        entity, def.name, e
                    ),
                    source: Some(Box::new(e)),
                })
            })?;
            return Ok(CoercionRule::Converter(converter));
        }
        if let Some((mode, variants)) = def.enumerated {
            return Ok(match mode {
                EnumMode::Ordinal => CoercionRule::EnumOrdinal(variants),
                EnumMode::Name => CoercionRule::EnumName(variants),
            });
        }
        if def.member_type == MemberType::Bool {
            return Ok(CoercionRule::BoolAsInt);
        }
        if let Some(width) = IntWidth::of(def.member_type) {
            return Ok(CoercionRule::DecimalNarrowing(width));
        }
        if def.member_type == MemberType::Text {
            return Ok(CoercionRule::TextStream);
        }
        Ok(CoercionRule::Identity)
    }

    /// Short rule name for logs and diagnostics.
    pub const fn kind(&self) -> &'static str {
        match self {
            CoercionRule::Converter(_) => "converter",
            CoercionRule::EnumOrdinal(_) => "enum-ordinal",
            CoercionRule::EnumName(_) => "enum-name",
            CoercionRule::BoolAsInt => "boolean-as-int",
            CoercionRule::DecimalNarrowing(_) => "decimal-narrowing",
            CoercionRule::TextStream => "text-stream",
            CoercionRule::Identity => "identity",
        }
    }
}

impl fmt::Debug for CoercionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoercionRule::DecimalNarrowing(width) => {
                f.debug_tuple("DecimalNarrowing").field(width).finish()
            }
            CoercionRule::EnumOrdinal(variants) | CoercionRule::EnumName(variants) => {
                f.debug_tuple(self.kind()).field(variants).finish()
            }
            other => f.write_str(other.kind()),
        }
    }
}

/// Member value to column value.
///
/// `target` is the parameter type the prepared statement reported for the
/// position this value is bound to.
#[allow(clippy::result_large_err)]
pub fn to_column_value<E>(
    desc: &MetadataDescriptor<E>,
    value: Value,
    target: Option<&SqlType>,
) -> Result<Value> {
    let rule = desc.coercion();
    if let CoercionRule::Converter(converter) = rule {
        let shape = value.type_name();
        return converter
            .to_column(value)
            .map_err(|e| failure(desc, shape, e.to_string()));
    }
    if value.is_null() {
        return Ok(value);
    }
    match rule {
        CoercionRule::EnumOrdinal(variants) => {
            let shape = value.type_name();
            let name = enum_name(desc, &value)?;
            variants
                .iter()
                .position(|v| *v == name)
                .and_then(|i| i32::try_from(i).ok())
                .map(Value::Int)
                .ok_or_else(|| failure(desc, shape, format!("'{}' is not a variant", name)))
        }
        CoercionRule::EnumName(variants) => {
            let name = enum_name(desc, &value)?;
            if variants.contains(&name) {
                Ok(value)
            } else {
                Err(failure(desc, value.type_name(), format!("'{}' is not a variant", name)))
            }
        }
        CoercionRule::BoolAsInt => {
            let flag = match value {
                Value::Bool(flag) => flag,
                other => return Ok(other),
            };
            Ok(target
                .and_then(|ty| ty.integer_value(i64::from(flag)))
                .unwrap_or(Value::Bool(flag)))
        }
        CoercionRule::DecimalNarrowing(_)
        | CoercionRule::TextStream
        | CoercionRule::Identity
        | CoercionRule::Converter(_) => Ok(value),
    }
}

/// Column value to member value.
#[allow(clippy::result_large_err)]
pub fn to_member_value<E>(desc: &MetadataDescriptor<E>, value: Value) -> Result<Value> {
    let rule = desc.coercion();
    if let CoercionRule::Converter(converter) = rule {
        let shape = value.type_name();
        return converter
            .to_member(value)
            .map_err(|e| failure(desc, shape, e.to_string()));
    }
    if value.is_null() {
        return Ok(value);
    }
    let shape = value.type_name();
    match rule {
        CoercionRule::EnumOrdinal(variants) => {
            let ordinal = value
                .as_i64()
                .filter(|_| value.is_integer())
                .ok_or_else(|| failure(desc, shape, "expected an integer ordinal"))?;
            usize::try_from(ordinal)
                .ok()
                .and_then(|i| variants.get(i))
                .map(|name| Value::Text((*name).to_string()))
                .ok_or_else(|| {
                    failure(
                        desc,
                        shape,
                        format!("ordinal {} is outside 0..{}", ordinal, variants.len()),
                    )
                })
        }
        CoercionRule::EnumName(variants) => {
            let known = matches!(&value, Value::Text(name) if variants.contains(&name.as_str()));
            if known {
                return Ok(value);
            }
            match &value {
                Value::Text(name) => {
                    Err(failure(desc, shape, format!("'{}' is not a variant", name)))
                }
                _ => Err(failure(desc, shape, "expected a variant name")),
            }
        }
        CoercionRule::BoolAsInt => {
            if value.is_integer() {
                Ok(Value::Bool(value.as_bool().unwrap_or(false)))
            } else {
                Ok(value)
            }
        }
        CoercionRule::DecimalNarrowing(width) => {
            let whole = match &value {
                Value::Decimal(text) => Some(truncate_decimal(text).ok_or_else(|| {
                    failure(desc, shape, format!("'{}' is not a number", text))
                })?),
                Value::Double(f) => Some(truncate_float(*f).ok_or_else(|| {
                    failure(desc, shape, format!("{} has no integer part", f))
                })?),
                Value::Float(f) => Some(truncate_float(f64::from(*f)).ok_or_else(|| {
                    failure(desc, shape, format!("{} has no integer part", f))
                })?),
                _ => None,
            };
            let Some(whole) = whole else {
                return Ok(value);
            };
            width.narrow(whole).ok_or_else(|| {
                failure(desc, shape, format!("{} does not fit {}", whole, width.label()))
            })
        }
        CoercionRule::TextStream => match value {
            Value::Bytes(bytes) => String::from_utf8(bytes)
                .map(Value::Text)
                .map_err(|_| failure(desc, shape, "character data is not valid UTF-8")),
            other => Ok(other),
        },
        CoercionRule::Identity | CoercionRule::Converter(_) => Ok(value),
    }
}

fn enum_name<'v, E>(desc: &MetadataDescriptor<E>, value: &'v Value) -> Result<&'v str> {
    match value {
        Value::Text(name) => Ok(name),
        other => Err(failure(desc, other.type_name(), "expected a variant name")),
    }
}

fn failure<E>(desc: &MetadataDescriptor<E>, shape: &'static str, message: impl Into<String>) -> Error {
    Error::mapping(desc.entity_name(), desc.member_name(), shape, message)
}

/// Truncate decimal text toward zero.
///
/// Accepts an optional sign, digits with an optional fraction, and an
/// optional exponent (`-12.75`, `1.5E+3`). Returns `None` for malformed
/// text or values beyond `i128`.
pub fn truncate_decimal(text: &str) -> Option<i128> {
    let text = text.trim();
    let (negative, unsigned) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(at) => (&unsigned[..at], unsigned[at + 1..].parse::<i32>().ok()?),
        None => (unsigned, 0),
    };
    let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    // position of the decimal point within int_part ++ frac_part
    let point = i64::try_from(int_part.len()).ok()? + i64::from(exponent);
    if point <= 0 {
        return Some(0);
    }
    let point = usize::try_from(point).ok()?;
    let digits = int_part.bytes().chain(frac_part.bytes());
    let available = int_part.len() + frac_part.len();
    if point > available + 40 {
        return None;
    }

    let mut whole: i128 = 0;
    for digit in digits.take(point) {
        whole = whole.checked_mul(10)?.checked_add(i128::from(digit - b'0'))?;
    }
    for _ in available..point {
        whole = whole.checked_mul(10)?;
    }
    Some(if negative { -whole } else { whole })
}

#[allow(clippy::cast_possible_truncation)]
fn truncate_float(value: f64) -> Option<i128> {
    if !value.is_finite() {
        return None;
    }
    let whole = value.trunc();
    // i128::MAX is about 1.7e38
    if whole.abs() >= 1.7e38 {
        return None;
    }
    Some(whole as i128)
}
