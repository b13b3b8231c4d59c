//! SQL parameter types reported by prepared statements.
//!
//! Drivers that know the declared type of each placeholder report it here.
//! The coercion matrix uses it to pick the integer width of a boolean
//! member; every other rule ignores it.

use crate::value::Value;
use std::fmt;

/// Declared type of one statement parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    VarChar(u32),
    Text,
    /// Large character object
    Clob,
    Blob,
    Date,
    Timestamp,
    Json,
    /// Anything the driver reports by name only
    Custom(&'static str),
}

impl SqlType {
    /// Is this one of the integer types?
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt
        )
    }

    /// `n` as a value of this integer type, or `None` for non-integer types
    /// and values that do not fit.
    pub fn integer_value(&self, n: i64) -> Option<Value> {
        match self {
            SqlType::TinyInt => i8::try_from(n).ok().map(Value::TinyInt),
            SqlType::SmallInt => i16::try_from(n).ok().map(Value::SmallInt),
            SqlType::Integer => i32::try_from(n).ok().map(Value::Int),
            SqlType::BigInt => Some(Value::BigInt(n)),
            _ => None,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlType::Decimal { precision, scale } => write!(f, "DECIMAL({precision}, {scale})"),
            SqlType::VarChar(len) => write!(f, "VARCHAR({len})"),
            SqlType::Custom(name) => f.write_str(name),
            SqlType::TinyInt => f.write_str("TINYINT"),
            SqlType::SmallInt => f.write_str("SMALLINT"),
            SqlType::Integer => f.write_str("INTEGER"),
            SqlType::BigInt => f.write_str("BIGINT"),
            SqlType::Real => f.write_str("REAL"),
            SqlType::Double => f.write_str("DOUBLE PRECISION"),
            SqlType::Boolean => f.write_str("BOOLEAN"),
            SqlType::Text => f.write_str("TEXT"),
            SqlType::Clob => f.write_str("CLOB"),
            SqlType::Blob => f.write_str("BLOB"),
            SqlType::Date => f.write_str("DATE"),
            SqlType::Timestamp => f.write_str("TIMESTAMP"),
            SqlType::Json => f.write_str("JSON"),
        }
    }
}
