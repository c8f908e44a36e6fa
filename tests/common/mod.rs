//! Common test utilities

use rand::seq::SliceRandom;
use serde_json::{json, Value};

use seriesdb::models::Point;
use seriesdb::node::Node;
use seriesdb::replication::ReplicationConfig;

/// Replication config with short retry delays
pub fn fast_replication() -> ReplicationConfig {
    ReplicationConfig::builder()
        .max_retries(3)
        .delays(5, 50)
        .bootstrap_chunk_size(4)
        .settle_timeout_ms(3_000)
        .build()
        .unwrap()
}

/// Create a node with short retry delays
pub fn create_node(id: &str) -> Node {
    Node::new(id, fast_replication())
}

/// Float points `(ts, ts / 10)` for `0..count` in random order
#[allow(dead_code)]
pub fn shuffled_floats(count: i64) -> Vec<Point> {
    let mut points: Vec<Point> = (0..count).map(|ts| Point::float(ts, ts as f64 / 10.0)).collect();
    points.shuffle(&mut rand::thread_rng());
    points
}

/// Integer points `(ts, ts * 3)` for `0..count` in random order
#[allow(dead_code)]
pub fn shuffled_integers(count: i64) -> Vec<Point> {
    let mut points: Vec<Point> = (0..count).map(|ts| Point::integer(ts, ts * 3)).collect();
    points.shuffle(&mut rand::thread_rng());
    points
}

/// Encode points as the `[[ts, value], ...]` request form
pub fn points_json(points: &[Point]) -> Value {
    json!(points)
}

/// Single series insert request
#[allow(dead_code)]
pub fn series_request(name: &str, points: &[Point]) -> Value {
    let mut request = serde_json::Map::new();
    request.insert(name.to_string(), points_json(points));
    Value::Object(request)
}
