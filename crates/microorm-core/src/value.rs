//! Runtime values, SQL type tags and the field-type bridge
//!
//! `Value` is what travels between entities, commands and rows. `ColumnValue`
//! ties a Rust field type to its declared `SqlType` so that query parameters
//! and id arguments can be type-checked before any statement runs.

use crate::errors::{OrmError, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Text representation used when date-times are stored as strings
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const DATETIME_PARSE_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Declared column type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Double,
    String,
    Guid,
    DateTime,
    Binary,
}

impl SqlType {
    /// Integer-valued keys are generated by the database
    pub fn is_numeric(&self) -> bool {
        matches!(self, SqlType::Int16 | SqlType::Int32 | SqlType::Int64)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::Boolean => "Boolean",
            SqlType::Int16 => "Int16",
            SqlType::Int32 => "Int32",
            SqlType::Int64 => "Int64",
            SqlType::Double => "Double",
            SqlType::String => "String",
            SqlType::Guid => "Guid",
            SqlType::DateTime => "DateTime",
            SqlType::Binary => "Binary",
        };
        f.write_str(name)
    }
}

/// A runtime value bound to a parameter or read from a row
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Double(f64),
    Text(String),
    Guid(Uuid),
    DateTime(NaiveDateTime),
    Binary(Vec<u8>),
}

impl Value {
    /// Type tag of the value; `None` for null
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Value::Null => None,
            Value::Bool(_) => Some(SqlType::Boolean),
            Value::Int16(_) => Some(SqlType::Int16),
            Value::Int32(_) => Some(SqlType::Int32),
            Value::Int64(_) => Some(SqlType::Int64),
            Value::Double(_) => Some(SqlType::Double),
            Value::Text(_) => Some(SqlType::String),
            Value::Guid(_) => Some(SqlType::Guid),
            Value::DateTime(_) => Some(SqlType::DateTime),
            Value::Binary(_) => Some(SqlType::Binary),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of integer-like values
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::Bool(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Canonical identity string, equal across integer widths
    pub fn identity_key(&self) -> String {
        match self {
            Value::Int16(_) | Value::Int32(_) | Value::Int64(_) => {
                self.as_i64().map(|v| v.to_string()).unwrap_or_default()
            }
            Value::Text(s) => s.clone(),
            Value::Guid(g) => g.hyphenated().to_string(),
            other => other.to_string(),
        }
    }

    /// Render as a SQL literal for non-parameterized contexts
    ///
    /// Embedded single quotes are doubled.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Int16(v) => v.to_string(),
            Value::Int32(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Guid(g) => format!("'{}'", g.hyphenated()),
            Value::DateTime(d) => format!("'{}'", d.format(DATETIME_FORMAT)),
            Value::Binary(bytes) => format!("X'{}'", hex::encode_upper(bytes)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Guid(v) => write!(f, "{}", v.hyphenated()),
            Value::DateTime(v) => write!(f, "{}", v.format(DATETIME_FORMAT)),
            Value::Binary(v) => write!(f, "0x{}", hex::encode(v)),
        }
    }
}

fn conversion_error(expected: SqlType, found: &Value) -> OrmError {
    OrmError::Conversion {
        expected,
        found: format!("{:?}", found),
    }
}

/// A Rust type that can be stored in a single column
pub trait ColumnValue: Sized + 'static {
    /// Declared type tag of the column
    const SQL_TYPE: SqlType;
    /// Whether the column accepts null
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;

    /// Decode a value read from storage
    ///
    /// Decoding is lenient about storage representation (an `Int64` cell
    /// decodes into `i32`, a text cell into `Uuid`) but never about type.
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! integer_column {
    ($ty:ty, $tag:ident) => {
        impl ColumnValue for $ty {
            const SQL_TYPE: SqlType = SqlType::$tag;

            fn to_value(&self) -> Value {
                Value::$tag(*self)
            }

            fn from_value(value: Value) -> Result<Self> {
                value
                    .as_i64()
                    .and_then(|v| <$ty>::try_from(v).ok())
                    .ok_or_else(|| conversion_error(SqlType::$tag, &value))
            }
        }

        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$tag(v)
            }
        }
    };
}

integer_column!(i16, Int16);
integer_column!(i32, Int32);
integer_column!(i64, Int64);

impl ColumnValue for bool {
    const SQL_TYPE: SqlType = SqlType::Boolean;

    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            ref other => other
                .as_i64()
                .map(|v| v != 0)
                .ok_or_else(|| conversion_error(SqlType::Boolean, other)),
        }
    }
}

impl ColumnValue for f64 {
    const SQL_TYPE: SqlType = SqlType::Double;

    fn to_value(&self) -> Value {
        Value::Double(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Double(v) => Ok(v),
            ref other => other
                .as_i64()
                .map(|v| v as f64)
                .ok_or_else(|| conversion_error(SqlType::Double, other)),
        }
    }
}

impl ColumnValue for String {
    const SQL_TYPE: SqlType = SqlType::String;

    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s),
            other => Err(conversion_error(SqlType::String, &other)),
        }
    }
}

impl ColumnValue for Uuid {
    const SQL_TYPE: SqlType = SqlType::Guid;

    fn to_value(&self) -> Value {
        Value::Guid(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Guid(g) => Ok(g),
            Value::Text(ref s) => Uuid::parse_str(s).map_err(|_| conversion_error(SqlType::Guid, &value)),
            Value::Binary(ref bytes) => {
                Uuid::from_slice(bytes).map_err(|_| conversion_error(SqlType::Guid, &value))
            }
            other => Err(conversion_error(SqlType::Guid, &other)),
        }
    }
}

impl ColumnValue for NaiveDateTime {
    const SQL_TYPE: SqlType = SqlType::DateTime;

    fn to_value(&self) -> Value {
        Value::DateTime(*self)
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(d) => Ok(d),
            Value::Text(ref s) => DATETIME_PARSE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .ok_or_else(|| conversion_error(SqlType::DateTime, &value)),
            other => Err(conversion_error(SqlType::DateTime, &other)),
        }
    }
}

impl ColumnValue for DateTime<Utc> {
    const SQL_TYPE: SqlType = SqlType::DateTime;

    fn to_value(&self) -> Value {
        Value::DateTime(self.naive_utc())
    }

    fn from_value(value: Value) -> Result<Self> {
        NaiveDateTime::from_value(value).map(|naive| Utc.from_utc_datetime(&naive))
    }
}

impl ColumnValue for Vec<u8> {
    const SQL_TYPE: SqlType = SqlType::Binary;

    fn to_value(&self) -> Value {
        Value::Binary(self.clone())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Binary(bytes) => Ok(bytes),
            other => Err(conversion_error(SqlType::Binary, &other)),
        }
    }
}

impl<T: ColumnValue> ColumnValue for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Guid(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v.naive_utc())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Store a fieldless enum as its `Int32` discriminant
///
/// The enum must be `Copy`, convert into `i32`, and implement
/// `TryFrom<i32>`.
///
/// ```
/// use microorm_core::column_enum;
///
/// #[derive(Debug, Clone, Copy, PartialEq, Default)]
/// enum Kind { #[default] Debit = 1, Credit = 2 }
///
/// impl From<Kind> for i32 {
///     fn from(k: Kind) -> i32 { k as i32 }
/// }
///
/// impl TryFrom<i32> for Kind {
///     type Error = ();
///     fn try_from(v: i32) -> Result<Self, ()> {
///         match v { 1 => Ok(Kind::Debit), 2 => Ok(Kind::Credit), _ => Err(()) }
///     }
/// }
///
/// column_enum!(Kind);
/// ```
#[macro_export]
macro_rules! column_enum {
    ($ty:ty) => {
        impl $crate::value::ColumnValue for $ty {
            const SQL_TYPE: $crate::value::SqlType = $crate::value::SqlType::Int32;

            fn to_value(&self) -> $crate::value::Value {
                $crate::value::Value::Int32(i32::from(*self))
            }

            fn from_value(value: $crate::value::Value) -> $crate::errors::Result<Self> {
                value
                    .as_i64()
                    .and_then(|v| i32::try_from(v).ok())
                    .and_then(|v| <$ty>::try_from(v).ok())
                    .ok_or_else(|| $crate::errors::OrmError::Conversion {
                        expected: $crate::value::SqlType::Int32,
                        found: format!("{:?}", value),
                    })
            }
        }

        impl From<$ty> for $crate::value::Value {
            fn from(v: $ty) -> Self {
                $crate::value::Value::Int32(i32::from(v))
            }
        }
    };
}
