//! Core data structures shared by the insert pipeline, the store and replication

use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ============================================================================
// Value
// ============================================================================

/// Kind of values a series holds
///
/// Established by the first accepted insert and never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Float,
    Integer,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Integer => "integer",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single scalar observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Float(f64),
    Integer(i64),
}

impl Value {
    /// Kind of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Float(_) => ValueType::Float,
            Self::Integer(_) => ValueType::Integer,
        }
    }

    /// Convert a JSON number into a value, keeping its integer/float kind
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                // Floats, and unsigned integers beyond i64::MAX
                None => n.as_f64().map(Self::Float),
            },
            _ => None,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Integer(i) => serializer.serialize_i64(*i),
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Number {
            Integer(i64),
            Float(f64),
        }

        Ok(match Number::deserialize(deserializer)? {
            Number::Integer(i) => Self::Integer(i),
            Number::Float(f) => Self::Float(f),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
        }
    }
}

// ============================================================================
// Point
// ============================================================================

/// One `(timestamp, value)` observation
///
/// Serializes as a two element array `[timestamp, value]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub timestamp: i64,
    pub value: Value,
}

impl Point {
    pub fn new(timestamp: i64, value: Value) -> Self {
        Self { timestamp, value }
    }

    pub fn float(timestamp: i64, value: f64) -> Self {
        Self::new(timestamp, Value::Float(value))
    }

    pub fn integer(timestamp: i64, value: i64) -> Self {
        Self::new(timestamp, Value::Integer(value))
    }
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.timestamp)?;
        tuple.serialize_element(&self.value)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (timestamp, value) = <(i64, Value)>::deserialize(deserializer)?;
        Ok(Self { timestamp, value })
    }
}

// ============================================================================
// Series batches and metadata
// ============================================================================

/// Points destined for one series, as produced by the validator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesBatch {
    pub name: String,
    pub value_type: ValueType,
    pub points: Vec<Point>,
}

impl SeriesBatch {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Metadata row describing a stored series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesInfo {
    pub name: String,
    pub length: usize,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub start: i64,
    pub end: i64,
}
