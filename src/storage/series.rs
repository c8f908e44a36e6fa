//! A single series: points keyed by timestamp in ascending order

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::models::{Point, SeriesInfo, Value, ValueType};

/// Outcome of merging a batch into a series
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Points accepted from the batch, overwrites included
    pub accepted: usize,
    /// Timestamps that did not exist before the merge
    pub created: usize,
}

/// Ordered, duplicate-free point sequence with a fixed value type
///
/// Two points never share a timestamp: merging a point with an existing
/// timestamp replaces the stored value.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    name: String,
    value_type: ValueType,
    points: BTreeMap<i64, Value>,
}

impl Series {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            points: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn start(&self) -> Option<i64> {
        self.points.keys().next().copied()
    }

    pub fn end(&self) -> Option<i64> {
        self.points.keys().next_back().copied()
    }

    /// Insert or overwrite points; the last point for a timestamp wins
    ///
    /// Callers check the batch value type against [`Series::value_type`]
    /// before merging.
    pub fn merge(&mut self, points: &[Point]) -> MergeOutcome {
        debug_assert!(points.iter().all(|p| p.value.value_type() == self.value_type));

        let mut outcome = MergeOutcome::default();
        for point in points {
            if self.points.insert(point.timestamp, point.value).is_none() {
                outcome.created += 1;
            }
            outcome.accepted += 1;
        }
        outcome
    }

    /// All points in ascending timestamp order
    pub fn points(&self) -> Vec<Point> {
        self.points
            .iter()
            .map(|(ts, value)| Point::new(*ts, *value))
            .collect()
    }

    /// Points with `start <= timestamp < end`, either bound optional
    pub fn range(&self, start: Option<i64>, end: Option<i64>) -> Vec<Point> {
        let lower = start.map_or(Bound::Unbounded, Bound::Included);
        let upper = end.map_or(Bound::Unbounded, Bound::Excluded);

        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Vec::new();
            }
        }

        self.points
            .range((lower, upper))
            .map(|(ts, value)| Point::new(*ts, *value))
            .collect()
    }

    /// Metadata row, `None` while the series holds no points
    pub fn info(&self) -> Option<SeriesInfo> {
        Some(SeriesInfo {
            name: self.name.clone(),
            length: self.len(),
            value_type: self.value_type,
            start: self.start()?,
            end: self.end()?,
        })
    }
}
