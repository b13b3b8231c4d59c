//! Result rows handed to the read pipeline by a driver.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Column metadata shared across all rows in a result set.
///
/// Wrapped in `Arc` so every row of one result shares a single copy.
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column labels in result order
    names: Vec<String>,
    /// Label -> index mapping
    name_to_index: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create new column info from a list of column labels.
    pub fn new(names: Vec<String>) -> Self {
        let mut name_to_index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // first occurrence wins for duplicated labels
            name_to_index.entry(name.clone()).or_insert(i);
        }
        Self {
            names,
            name_to_index,
        }
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get the index of a column by exact label.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Get the label of a column by index.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Get all column labels.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A single row returned from a query.
///
/// Values are addressable by 0-based index, by 1-based ordinal and by label.
#[derive(Debug, Clone)]
pub struct Row {
    values: Vec<Value>,
    columns: Arc<ColumnInfo>,
}

impl Row {
    /// Create a new row with the given columns and values.
    pub fn new(column_names: Vec<String>, values: Vec<Value>) -> Self {
        let columns = Arc::new(ColumnInfo::new(column_names));
        Self { values, columns }
    }

    /// Create a new row with shared column metadata.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get the shared column metadata.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if this row is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by 0-based column index.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get a value by 1-based ordinal, the way relational drivers number columns.
    pub fn get_ordinal(&self, ordinal: usize) -> Option<&Value> {
        ordinal.checked_sub(1).and_then(|i| self.values.get(i))
    }

    /// Get a value by exact column label.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns.index_of(name).and_then(|i| self.values.get(i))
    }

    /// Get a typed value by column label.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self.get_by_name(name).ok_or_else(|| {
            Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("column '{}' not found", name),
                column: Some(name.to_string()),
                rust_type: None,
            })
        })?;
        T::from_value(value).map_err(|e| match e {
            Error::Type(mut te) => {
                te.column = Some(name.to_string());
                Error::Type(te)
            }
            e => e,
        })
    }

    /// Get all column labels.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    /// Iterate over (column_label, value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Consume the row, yielding owned (column_label, value) pairs.
    pub fn into_pairs(self) -> impl Iterator<Item = (String, Value)> {
        let names = self.columns.names().to_vec();
        names.into_iter().zip(self.values)
    }
}

/// Trait for converting from a `Value` to a typed member value.
///
/// Member setters generated by `#[derive(Entity)]` go through this trait.
pub trait FromValue: Sized {
    /// Convert from a Value, returning an error if the conversion fails.
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

fn type_mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
        rust_type: None,
    })
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| type_mismatch("bool", value))
    }
}

// Integers accept any integer variant that fits, so a driver reporting every
// integer as BIGINT still hydrates narrower members.
macro_rules! integer_from_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &Value) -> Result<Self> {
                    let wide = match value {
                        Value::Decimal(_) => value.as_i128(),
                        other => other.as_i64().map(i128::from),
                    }
                    .ok_or_else(|| type_mismatch(stringify!($ty), value))?;
                    <$ty>::try_from(wide).map_err(|_| {
                        Error::Type(TypeError {
                            expected: stringify!($ty),
                            actual: format!("value {} out of range", wide),
                            column: None,
                            rust_type: None,
                        })
                    })
                }
            }
        )*
    };
}

integer_from_value!(i8, i16, i32, i64, i128, u8, u16, u32, u64);

#[allow(clippy::cast_possible_truncation)]
impl FromValue for f32 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            other => other
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| type_mismatch("f32", value)),
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| type_mismatch("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) | Value::Decimal(s) => Ok(s.clone()),
            _ => Err(type_mismatch("String", value)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| type_mismatch("Vec<u8>", value))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|e| {
                Error::Type(TypeError {
                    expected: "valid JSON",
                    actual: format!("invalid JSON: {}", e),
                    column: None,
                    rust_type: None,
                })
            }),
            _ => Err(type_mismatch("JSON", value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_basic_access() {
        let row = Row::new(
            vec!["id".to_string(), "name".to_string(), "age".to_string()],
            vec![
                Value::Int(1),
                Value::Text("Alice".to_string()),
                Value::Int(30),
            ],
        );

        assert_eq!(row.len(), 3);
        assert_eq!(row.get(0), Some(&Value::Int(1)));
        assert_eq!(row.get(3), None);
        assert_eq!(row.get_by_name("age"), Some(&Value::Int(30)));
        assert_eq!(row.get_by_name("missing"), None);
    }

    #[test]
    fn test_row_ordinal_access_is_one_based() {
        let row = Row::new(
            vec!["a".to_string(), "b".to_string()],
            vec![Value::Int(10), Value::Int(20)],
        );
        assert_eq!(row.get_ordinal(0), None);
        assert_eq!(row.get_ordinal(1), Some(&Value::Int(10)));
        assert_eq!(row.get_ordinal(2), Some(&Value::Int(20)));
        assert_eq!(row.get_ordinal(3), None);
    }

    #[test]
    fn test_row_typed_access_and_errors() {
        let row = Row::new(
            vec!["id".to_string(), "name".to_string()],
            vec![Value::BigInt(42), Value::Text("Bob".to_string())],
        );

        assert_eq!(row.get_named::<i32>("id").unwrap(), 42);
        assert_eq!(row.get_named::<String>("name").unwrap(), "Bob");

        let err = row.get_named::<i32>("name").unwrap_err();
        match err {
            Error::Type(te) => assert_eq!(te.column.as_deref(), Some("name")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(row.get_named::<i32>("missing").is_err());
    }

    #[test]
    fn test_row_shared_columns_and_pairs() {
        let columns = Arc::new(ColumnInfo::new(vec!["id".to_string(), "name".to_string()]));
        let row1 = Row::with_columns(
            Arc::clone(&columns),
            vec![Value::Int(1), Value::Text("Alice".to_string())],
        );
        let row2 = Row::with_columns(Arc::clone(&columns), vec![Value::Int(2), Value::Null]);
        assert!(Arc::ptr_eq(&row1.column_info(), &row2.column_info()));

        let pairs: Vec<_> = row2.into_pairs().collect();
        assert_eq!(
            pairs,
            vec![
                ("id".to_string(), Value::Int(2)),
                ("name".to_string(), Value::Null)
            ]
        );
    }

    #[test]
    fn test_duplicate_labels_resolve_to_first() {
        let info = ColumnInfo::new(vec!["id".to_string(), "id".to_string()]);
        assert_eq!(info.index_of("id"), Some(0));
        assert_eq!(info.len(), 2);
        assert_eq!(info.name_at(1), Some("id"));
    }

    #[test]
    fn test_integer_widening_and_range_checks() {
        assert_eq!(i8::from_value(&Value::BigInt(12)).unwrap(), 12);
        assert!(i8::from_value(&Value::BigInt(300)).is_err());
        assert_eq!(i32::from_value(&Value::SmallInt(-5)).unwrap(), -5);
        assert_eq!(i128::from_value(&Value::Decimal("99".into())).unwrap(), 99);
        assert!(u16::from_value(&Value::Int(-1)).is_err());
        assert!(i64::from_value(&Value::Text("1".into())).is_err());
    }

    #[test]
    fn test_from_value_other_types() {
        assert!(bool::from_value(&Value::Int(1)).unwrap());
        let pi = std::f64::consts::PI;
        assert!((f64::from_value(&Value::Double(pi)).unwrap() - pi).abs() < 1e-12);
        assert!((f32::from_value(&Value::Double(1.5)).unwrap() - 1.5).abs() < 1e-6);
        assert_eq!(
            Vec::<u8>::from_value(&Value::Bytes(vec![1, 2, 3])).unwrap(),
            vec![1, 2, 3]
        );
        assert_eq!(Option::<i32>::from_value(&Value::Null).unwrap(), None);
        assert!(i32::from_value(&Value::Null).is_err());
        assert_eq!(
            serde_json::Value::from_value(&Value::Text("{\"a\":1}".into())).unwrap(),
            serde_json::json!({"a": 1})
        );
    }
}
