//! Normalizes the accepted request shapes into one representation
//!
//! Accepted shapes:
//!
//! ```text
//! {}  or  []                                  -> nothing to insert
//! {"cpu": [[ts, value], ...], ...}            -> mapping form
//! [{"name": "cpu", "points": [[ts, value], ...]}, ...]  -> records form
//! ```
//!
//! The parser checks only the container shape. Point contents are carried
//! over as tagged scalars so the validator can reject them with a precise
//! reason.

use serde_json::{Map, Value};

use super::error::InsertError;

/// Which of the accepted shapes a request used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestShape {
    Empty,
    Mapping,
    Records,
}

/// A scalar found inside a point
#[derive(Debug, Clone, PartialEq)]
pub enum RawScalar {
    Integer(i64),
    Float(f64),
    /// Anything else (string, bool, null, nested container)
    Other(&'static str),
}

impl RawScalar {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => n.as_f64().map_or(Self::Other("number"), Self::Float),
            },
            Value::String(_) => Self::Other("string"),
            Value::Bool(_) => Self::Other("bool"),
            Value::Null => Self::Other("null"),
            Value::Array(_) => Self::Other("list"),
            Value::Object(_) => Self::Other("map"),
        }
    }
}

/// A point as submitted
#[derive(Debug, Clone, PartialEq)]
pub enum RawPoint {
    Pair { timestamp: RawScalar, value: RawScalar },
    /// Not a two element list
    Malformed,
}

impl RawPoint {
    fn from_json(value: &Value) -> Self {
        match value.as_array().map(Vec::as_slice) {
            Some([timestamp, value]) => Self::Pair {
                timestamp: RawScalar::from_json(timestamp),
                value: RawScalar::from_json(value),
            },
            _ => Self::Malformed,
        }
    }
}

/// Points submitted for one series name
#[derive(Debug, Clone, PartialEq)]
pub struct RawSeries {
    pub name: String,
    pub points: Vec<RawPoint>,
}

/// Canonical form of an insert request
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRequest {
    pub shape: RequestShape,
    pub series: Vec<RawSeries>,
}

impl ParsedRequest {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total number of submitted points, valid or not
    pub fn point_count(&self) -> usize {
        self.series.iter().map(|s| s.points.len()).sum()
    }
}

fn parse_points(name: &str, value: &Value) -> Result<Vec<RawPoint>, InsertError> {
    value
        .as_array()
        .map(|points| points.iter().map(RawPoint::from_json).collect())
        .ok_or_else(|| InsertError::malformed(format!("points for series '{name}' must be a list")))
}

fn parse_mapping(map: &Map<String, Value>) -> Result<Vec<RawSeries>, InsertError> {
    map.iter()
        .map(|(name, points)| {
            Ok(RawSeries {
                name: name.clone(),
                points: parse_points(name, points)?,
            })
        })
        .collect()
}

fn parse_records(records: &[Value]) -> Result<Vec<RawSeries>, InsertError> {
    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let record = record
                .as_object()
                .ok_or_else(|| InsertError::malformed(format!("record {index} must be a map")))?;

            let name = match record.get("name") {
                Some(Value::String(name)) => name.clone(),
                Some(_) => {
                    return Err(InsertError::malformed(format!(
                        "record {index}: 'name' must be a string"
                    )))
                }
                None => {
                    return Err(InsertError::malformed(format!(
                        "record {index}: missing 'name'"
                    )))
                }
            };

            let points = record
                .get("points")
                .ok_or_else(|| InsertError::malformed(format!("record {index}: missing 'points'")))?;

            Ok(RawSeries {
                points: parse_points(&name, points)?,
                name,
            })
        })
        .collect()
}

/// Parse a decoded JSON request body
pub fn parse(body: &Value) -> Result<ParsedRequest, InsertError> {
    let (shape, series) = match body {
        Value::Object(map) if map.is_empty() => (RequestShape::Empty, Vec::new()),
        Value::Array(list) if list.is_empty() => (RequestShape::Empty, Vec::new()),
        Value::Object(map) => (RequestShape::Mapping, parse_mapping(map)?),
        Value::Array(list) => (RequestShape::Records, parse_records(list)?),
        other => {
            return Err(InsertError::malformed(format!(
                "expected a map or a list, got {}",
                RawScalar::from_json(other).kind()
            )))
        }
    };

    Ok(ParsedRequest { shape, series })
}

/// Parse a raw request body
pub fn parse_slice(bytes: &[u8]) -> Result<ParsedRequest, InsertError> {
    let body: Value = serde_json::from_slice(bytes)
        .map_err(|e| InsertError::malformed(format!("invalid JSON: {e}")))?;
    parse(&body)
}

impl RawScalar {
    /// Human readable kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Other(kind) => kind,
        }
    }
}
