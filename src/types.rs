//! STRATA - Core Type Definitions
//! Defines fundamental types used across the storage engine.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key type for the storage engine.
pub type Key = String;

/// Application value stored under a key.
///
/// The set of shapes is closed so every value has a total, reversible
/// encoding. On disk each variant is written as its natural JSON form.
/// `Null` is an ordinary value and is never confused with a deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Deepest list/map nesting a value may have. Segment records wrap the
/// value in two more JSON objects and must stay under serde_json's read
/// limit of 128.
pub const MAX_NESTING_DEPTH: usize = 100;

impl Value {
    /// Returns false if the value holds a NaN or infinite float, which JSON
    /// cannot carry, or nests deeper than [`MAX_NESTING_DEPTH`], which could
    /// be written but never read back.
    pub fn is_encodable(&self) -> bool {
        self.encodable_within(MAX_NESTING_DEPTH)
    }

    fn encodable_within(&self, depth: usize) -> bool {
        match self {
            Value::Float(f) => f.is_finite(),
            Value::List(_) | Value::Map(_) if depth == 0 => false,
            Value::List(items) => items.iter().all(|v| v.encodable_within(depth - 1)),
            Value::Map(map) => map.values().all(|v| v.encodable_within(depth - 1)),
            _ => true,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

/// What a key slot holds in the MemTable or in a segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stored {
    Value(Value),
    /// Deletion marker; shadows older values until compaction drops it.
    Tombstone,
}

impl Stored {
    /// Returns true if this slot is a tombstone.
    pub fn is_tombstone(&self) -> bool {
        matches!(self, Stored::Tombstone)
    }

    /// Converts into the caller-facing view, where a tombstone reads as absent.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Stored::Value(value) => Some(value),
            Stored::Tombstone => None,
        }
    }
}

/// Three-way result of a point lookup in one layer (MemTable or segment).
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// The layer holds a live value for the key.
    Present(Value),
    /// The layer holds a tombstone; older layers must not be consulted.
    Tombstone,
    /// The layer knows nothing about the key.
    Absent,
}

impl From<Stored> for Lookup {
    fn from(stored: Stored) -> Self {
        match stored {
            Stored::Value(value) => Lookup::Present(value),
            Stored::Tombstone => Lookup::Tombstone,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_json_shapes() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::Int(1));
        map.insert("b".to_string(), Value::List(vec![Value::Bool(true), Value::Null]));
        let value = Value::Map(map);

        let encoded = serde_json::to_string(&value).unwrap();
        assert_eq!(encoded, r#"{"a":1,"b":[true,null]}"#);
        let decoded: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_int_and_float_stay_distinct() {
        let int: Value = serde_json::from_str("3").unwrap();
        let float: Value = serde_json::from_str("3.5").unwrap();
        assert_eq!(int, Value::Int(3));
        assert_eq!(float, Value::Float(3.5));
    }

    #[test]
    fn test_null_is_not_a_tombstone() {
        let stored = Stored::Value(Value::Null);
        assert!(!stored.is_tombstone());
        assert_eq!(serde_json::to_string(&stored).unwrap(), r#"{"value":null}"#);
        assert_eq!(
            serde_json::to_string(&Stored::Tombstone).unwrap(),
            r#""tombstone""#
        );
        assert_eq!(stored.into_value(), Some(Value::Null));
    }

    #[test]
    fn test_non_finite_floats_not_encodable() {
        assert!(Value::Float(1.5).is_encodable());
        assert!(!Value::Float(f64::NAN).is_encodable());
        assert!(!Value::List(vec![Value::Float(f64::INFINITY)]).is_encodable());
    }

    fn nested_list(depth: usize) -> Value {
        (0..depth).fold(Value::Int(0), |inner, _| Value::List(vec![inner]))
    }

    #[test]
    fn test_nesting_depth_limit() {
        assert!(nested_list(MAX_NESTING_DEPTH).is_encodable());
        assert!(!nested_list(MAX_NESTING_DEPTH + 1).is_encodable());
        assert!(!nested_list(200).is_encodable());

        let mut map = BTreeMap::new();
        map.insert("deep".to_string(), nested_list(MAX_NESTING_DEPTH));
        assert!(!Value::Map(map).is_encodable());
    }

    #[test]
    fn test_deepest_allowed_value_reads_back() {
        let stored = Stored::Value(nested_list(MAX_NESTING_DEPTH));
        let line = serde_json::to_string(&serde_json::json!({ "key": "k", "stored": stored }))
            .unwrap();
        let decoded: serde_json::Value = serde_json::from_str(&line).unwrap();
        let back: Stored = serde_json::from_value(decoded["stored"].clone()).unwrap();
        assert_eq!(back, stored);
    }

    #[test]
    fn test_lookup_from_stored() {
        assert_eq!(Lookup::from(Stored::Tombstone), Lookup::Tombstone);
        assert_eq!(
            Lookup::from(Stored::Value(Value::from("x"))),
            Lookup::Present(Value::Str("x".to_string()))
        );
    }
}
