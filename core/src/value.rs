//! Native column value model.
//!
//! [`Value`] is the lowest common denominator between typed entity fields and
//! the engine's four storage classes. Encoders here are the single source of
//! truth for the scalar mappings: booleans become nonzero INTEGER, timestamps
//! become epoch-seconds INTEGER.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A native column value.
///
/// # Examples
///
/// ```
/// use rowmap_core::Value;
///
/// let v = Value::from(true);
/// assert_eq!(v, Value::Integer(1));
/// assert_eq!(Value::from("hi"), Value::Text("hi".to_string()));
/// assert!(Value::Null.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// INTEGER storage class.
    Integer(i64),
    /// REAL storage class.
    Real(f64),
    /// TEXT storage class.
    Text(String),
    /// BLOB storage class.
    Blob(Vec<u8>),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the storage-class name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Integer(_) => "INTEGER",
            Value::Real(_) => "REAL",
            Value::Text(_) => "TEXT",
            Value::Blob(_) => "BLOB",
        }
    }

    /// Encodes a timestamp as epoch seconds.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::DateTime;
    /// use rowmap_core::Value;
    ///
    /// let dt = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    /// assert_eq!(Value::from_datetime(&dt), Value::Integer(1_700_000_000));
    /// ```
    pub fn from_datetime(dt: &DateTime<Utc>) -> Self {
        Value::Integer(dt.timestamp())
    }

    /// Decodes an epoch-seconds INTEGER back into a timestamp.
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Integer(secs) => DateTime::from_timestamp(*secs, 0),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is an INTEGER.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the text payload, if this is TEXT.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(i64::from(b))
    }
}

impl From<i16> for Value {
    fn from(i: i16) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f32> for Value {
    fn from(f: f32) -> Self {
        Value::Real(f64::from(f))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Value::from_datetime(&dt)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}
