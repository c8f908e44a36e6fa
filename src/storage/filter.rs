//! Property filters for series listings
//!
//! A filter is a conjunction of conditions on the properties of a listed
//! series, written as `<property> <operator> <value>` and joined with
//! `and`, for example `length >= 100 and type == float`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::models::{SeriesInfo, ValueType};

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn matches(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// One condition on a series property
#[derive(Debug, Clone, PartialEq)]
pub enum SeriesCondition {
    Name(Comparison, String),
    NameContains(String),
    Length(Comparison, usize),
    Start(Comparison, i64),
    End(Comparison, i64),
    Type(Comparison, ValueType),
}

impl SeriesCondition {
    pub fn matches(&self, info: &SeriesInfo) -> bool {
        match self {
            Self::Name(op, name) => op.matches(info.name.as_str().cmp(name.as_str())),
            Self::NameContains(part) => info.name.contains(part.as_str()),
            Self::Length(op, length) => op.matches(info.length.cmp(length)),
            Self::Start(op, ts) => op.matches(info.start.cmp(ts)),
            Self::End(op, ts) => op.matches(info.end.cmp(ts)),
            Self::Type(op, tp) => match op {
                Comparison::Eq => info.value_type == *tp,
                Comparison::Ne => info.value_type != *tp,
                // Ordering on types follows the declaration order
                _ => op.matches((info.value_type as u8).cmp(&(*tp as u8))),
            },
        }
    }
}

/// Errors parsing a filter expression
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("expected '<property> <operator> <value>', got '{0}'")]
    Syntax(String),

    #[error("unknown series property '{0}'")]
    UnknownProperty(String),

    #[error("invalid value '{value}' for property '{property}'")]
    InvalidValue { property: String, value: String },

    #[error("operator '{operator}' not supported for property '{property}'")]
    UnsupportedOperator { property: String, operator: String },
}

const OPERATORS: [(&str, Comparison); 6] = [
    ("==", Comparison::Eq),
    ("!=", Comparison::Ne),
    ("<=", Comparison::Le),
    (">=", Comparison::Ge),
    ("<", Comparison::Lt),
    (">", Comparison::Gt),
];

impl FromStr for SeriesCondition {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        // "name contains <text>" is the only word operator
        if let Some(rest) = s.strip_prefix("name") {
            if let Some(part) = rest.trim_start().strip_prefix("contains ") {
                return Ok(Self::NameContains(unquote(part.trim()).to_string()));
            }
        }

        let (pos, token, op) = OPERATORS
            .iter()
            .filter_map(|(token, op)| s.find(token).map(|pos| (pos, *token, *op)))
            .min_by_key(|(pos, token, _)| (*pos, std::cmp::Reverse(token.len())))
            .ok_or_else(|| FilterError::Syntax(s.to_string()))?;

        let property = s[..pos].trim();
        let value = s[pos + token.len()..].trim();
        if property.is_empty() || value.is_empty() {
            return Err(FilterError::Syntax(s.to_string()));
        }

        let invalid = || FilterError::InvalidValue {
            property: property.to_string(),
            value: value.to_string(),
        };

        match property {
            "name" => Ok(Self::Name(op, unquote(value).to_string())),
            "length" => Ok(Self::Length(op, value.parse().map_err(|_| invalid())?)),
            "start" => Ok(Self::Start(op, value.parse().map_err(|_| invalid())?)),
            "end" => Ok(Self::End(op, value.parse().map_err(|_| invalid())?)),
            "type" => {
                if !matches!(op, Comparison::Eq | Comparison::Ne) {
                    return Err(FilterError::UnsupportedOperator {
                        property: property.to_string(),
                        operator: op.as_str().to_string(),
                    });
                }
                let tp = match unquote(value) {
                    "float" => ValueType::Float,
                    "integer" => ValueType::Integer,
                    _ => return Err(invalid()),
                };
                Ok(Self::Type(op, tp))
            }
            other => Err(FilterError::UnknownProperty(other.to_string())),
        }
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Conjunction of conditions; the empty filter matches everything
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesFilter {
    conditions: Vec<SeriesCondition>,
}

impl SeriesFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: SeriesCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn matches(&self, info: &SeriesInfo) -> bool {
        self.conditions.iter().all(|c| c.matches(info))
    }
}

impl FromStr for SeriesFilter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Ok(Self::all());
        }

        let conditions = split_conjunction(s)
            .into_iter()
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { conditions })
    }
}

/// Split on ` and ` outside double-quoted values
fn split_conjunction(s: &str) -> Vec<&str> {
    const SEPARATOR: &str = " and ";

    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;

    for (index, c) in s.char_indices() {
        if c == '"' {
            quoted = !quoted;
        } else if !quoted && index >= start && s[index..].starts_with(SEPARATOR) {
            parts.push(&s[start..index]);
            start = index + SEPARATOR.len();
        }
    }
    parts.push(&s[start..]);
    parts
}

impl fmt::Display for SeriesCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(op, name) => write!(f, "name {} \"{name}\"", op.as_str()),
            Self::NameContains(part) => write!(f, "name contains \"{part}\""),
            Self::Length(op, v) => write!(f, "length {} {v}", op.as_str()),
            Self::Start(op, v) => write!(f, "start {} {v}", op.as_str()),
            Self::End(op, v) => write!(f, "end {} {v}", op.as_str()),
            Self::Type(op, tp) => write!(f, "type {} {tp}", op.as_str()),
        }
    }
}
