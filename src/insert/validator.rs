//! Validation of parsed insert requests
//!
//! Runs over the whole request before anything is merged. Any violation
//! rejects the request as a unit.

use std::collections::HashMap;

use crate::models::{Point, SeriesBatch, Value, ValueType};

use super::error::ValidationError;
use super::parser::{ParsedRequest, RawPoint, RawScalar, RawSeries};

fn validate_point(series: &str, index: usize, point: &RawPoint) -> Result<Point, ValidationError> {
    let (timestamp, value) = match point {
        RawPoint::Pair { timestamp, value } => (timestamp, value),
        RawPoint::Malformed => {
            return Err(ValidationError::InvalidPoint {
                series: series.to_string(),
                index,
            })
        }
    };

    let timestamp = match timestamp {
        RawScalar::Integer(ts) => *ts,
        RawScalar::Float(_) | RawScalar::Other(_) => {
            return Err(ValidationError::InvalidTimestamp {
                series: series.to_string(),
                index,
            })
        }
    };

    let value = match value {
        RawScalar::Integer(v) => Value::Integer(*v),
        RawScalar::Float(v) => Value::Float(*v),
        RawScalar::Other(_) => {
            return Err(ValidationError::InvalidValue {
                series: series.to_string(),
                index,
            })
        }
    };

    Ok(Point::new(timestamp, value))
}

fn check_kind(
    series: &str,
    index: usize,
    expected: ValueType,
    point: &Point,
) -> Result<(), ValidationError> {
    let found = point.value.value_type();
    if found != expected {
        return Err(ValidationError::MixedValueTypes {
            series: series.to_string(),
            index,
            expected,
            found,
        });
    }
    Ok(())
}

fn validate_series(raw: &RawSeries) -> Result<SeriesBatch, ValidationError> {
    if raw.name.is_empty() {
        return Err(ValidationError::EmptySeriesName);
    }
    if raw.points.is_empty() {
        return Err(ValidationError::NoPoints {
            series: raw.name.clone(),
        });
    }

    let mut points = Vec::with_capacity(raw.points.len());
    for (index, point) in raw.points.iter().enumerate() {
        points.push(validate_point(&raw.name, index, point)?);
    }

    // The first value fixes the type for the whole series in this request
    let value_type = points[0].value.value_type();
    for (index, point) in points.iter().enumerate().skip(1) {
        check_kind(&raw.name, index, value_type, point)?;
    }

    Ok(SeriesBatch {
        name: raw.name.clone(),
        value_type,
        points,
    })
}

/// Validate a parsed request into one batch per series
///
/// Records naming the same series are combined in submission order. The
/// returned batches keep the order in which series first appear.
pub fn validate(request: &ParsedRequest) -> Result<Vec<SeriesBatch>, ValidationError> {
    let mut batches: Vec<SeriesBatch> = Vec::with_capacity(request.series.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for raw in &request.series {
        let batch = validate_series(raw)?;

        match positions.get(raw.name.as_str()) {
            Some(&position) => {
                let existing = &mut batches[position];
                let offset = existing.points.len();
                if let Some(first) = batch.points.first() {
                    check_kind(&existing.name, offset, existing.value_type, first)?;
                }
                existing.points.extend(batch.points);
            }
            None => {
                positions.insert(raw.name.as_str(), batches.len());
                batches.push(batch);
            }
        }
    }

    Ok(batches)
}

/// Check that a prebuilt batch is internally consistent
///
/// Every point must carry the batch's declared value type. Batches built by
/// [`validate`] always pass; replicated batches arrive prebuilt and are
/// checked here before anything is merged.
pub fn check_batch(batch: &SeriesBatch) -> Result<(), ValidationError> {
    if batch.name.is_empty() {
        return Err(ValidationError::EmptySeriesName);
    }
    if batch.points.is_empty() {
        return Err(ValidationError::NoPoints {
            series: batch.name.clone(),
        });
    }
    for (index, point) in batch.points.iter().enumerate() {
        check_kind(&batch.name, index, batch.value_type, point)?;
    }
    Ok(())
}

/// Check a batch against the type a series already holds
pub fn check_established(
    batch: &SeriesBatch,
    established: Option<ValueType>,
) -> Result<(), ValidationError> {
    match established {
        Some(established) if established != batch.value_type => {
            Err(ValidationError::TypeMismatch {
                series: batch.name.clone(),
                established,
                found: batch.value_type,
            })
        }
        _ => Ok(()),
    }
}

/// Build a batch from already typed points
///
/// Returns `None` for an empty point list.
pub fn homogeneous_batch(
    name: &str,
    points: &[Point],
) -> Result<Option<SeriesBatch>, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptySeriesName);
    }
    let Some(first) = points.first() else {
        return Ok(None);
    };

    let value_type = first.value.value_type();
    for (index, point) in points.iter().enumerate() {
        check_kind(name, index, value_type, point)?;
    }

    Ok(Some(SeriesBatch {
        name: name.to_string(),
        value_type,
        points: points.to_vec(),
    }))
}
