//! Document field values
//!
//! `Value` mirrors the Firestore value model. Its serde representation is the
//! REST v1 JSON encoding (`{"stringValue": "..."}`, `{"integerValue": "42"}`,
//! ...), so the same type serves the in-memory engine and the REST adapter.

use super::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Field name → value map of a document
pub type Fields = BTreeMap<String, Value>;

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Explicit null
    #[serde(rename = "nullValue")]
    Null(()),

    /// Boolean
    #[serde(rename = "booleanValue")]
    Boolean(bool),

    /// 64-bit integer (decimal string on the wire)
    #[serde(rename = "integerValue")]
    Integer(#[serde(with = "integer_string")] i64),

    /// Double precision float
    #[serde(rename = "doubleValue")]
    Double(f64),

    /// Store-native timestamp
    #[serde(rename = "timestampValue")]
    Timestamp(Timestamp),

    /// UTF-8 string
    #[serde(rename = "stringValue")]
    String(String),

    /// Array of values
    #[serde(rename = "arrayValue")]
    Array(ArrayValue),

    /// Nested map
    #[serde(rename = "mapValue")]
    Map(MapValue),
}

/// Array payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    /// Elements in order
    #[serde(default)]
    pub values: Vec<Value>,
}

/// Map payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    /// Nested fields
    #[serde(default)]
    pub fields: Fields,
}

impl Value {
    /// The null value
    pub const NULL: Value = Value::Null(());

    /// Check for explicit null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(()))
    }

    /// Borrow as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as float, accepting integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Get as timestamp
    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null(()) => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Double(_) => "double",
            Value::Timestamp(_) => "timestamp",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Rank of the value's type in the store's cross-type ordering
    fn type_rank(&self) -> u8 {
        match self {
            Value::Null(()) => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Double(_) => 2,
            Value::Timestamp(_) => 3,
            Value::String(_) => 4,
            Value::Array(_) => 5,
            Value::Map(_) => 6,
        }
    }

    /// Total order used by `order by` clauses
    ///
    /// Values of different types order by type rank. Integers and doubles
    /// compare numerically against each other.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Integer(_) | Value::Double(_), Value::Integer(_) | Value::Double(_)) => {
                let (a, b) = (self.as_f64().unwrap_or_default(), other.as_f64().unwrap_or_default());
                a.total_cmp(&b)
            }
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.values.iter().zip(b.values.iter()) {
                    let ord = x.compare(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.values.len().cmp(&b.values.len())
            }
            (Value::Map(a), Value::Map(b)) => {
                for ((ka, va), (kb, vb)) in a.fields.iter().zip(b.fields.iter()) {
                    let ord = ka.cmp(kb).then_with(|| va.compare(vb));
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.fields.len().cmp(&b.fields.len())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Equality as evaluated by `==` filters (`2 == 2.0`)
    pub fn query_eq(&self, other: &Value) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Integer(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        Value::Timestamp(ts)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::NULL,
        }
    }
}

/// `integerValue` is a decimal string in REST JSON; accept bare numbers too
mod integer_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Text(String),
        Number(i64),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match Wire::deserialize(deserializer)? {
            Wire::Number(n) => Ok(n),
            Wire::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
