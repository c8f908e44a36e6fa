//! Insert pipeline scenarios
//!
//! Tests a client request end to end:
//! 1. Parse and validate
//! 2. Merge into the store
//! 3. Acknowledge with the accepted point count

use serde_json::json;

use seriesdb::insert::{InsertError, ValidationError};
use seriesdb::models::{Point, ValueType};
use seriesdb::storage::SeriesFilter;

use crate::common::{create_node, points_json, series_request, shuffled_floats, shuffled_integers};

// ============================================================================
// Acknowledgment Tests
// ============================================================================

#[tokio::test]
async fn test_empty_request_acknowledged() {
    let node = create_node("node-a");

    let ack = node.insert(&json!({})).await.unwrap();
    assert_eq!(ack.message(), "Inserted 0 point(s) successfully.");

    let ack = node.insert(&json!([])).await.unwrap();
    assert_eq!(ack.points, 0);
    assert!(node.store().is_empty().await);
}

#[tokio::test]
async fn test_count_sums_all_series() {
    let node = create_node("node-a");
    let ack = node
        .insert(&json!({
            "a": [[1, 1], [2, 2], [3, 3]],
            "b": [[1, 0.5]]
        }))
        .await
        .unwrap();

    assert_eq!(ack.points, 4);
    assert_eq!(ack.message(), "Inserted 4 point(s) successfully.");
}

#[tokio::test]
async fn test_list_of_records_shape() {
    let node = create_node("node-a");
    let ack = node
        .insert(&json!([
            {"name": "a", "points": [[1, 1]]},
            {"name": "b", "points": [[1, 0.25], [2, 0.5]]}
        ]))
        .await
        .unwrap();

    assert_eq!(ack.points, 3);
    assert_eq!(node.store().read("b").await.len(), 2);
}

// ============================================================================
// Rejection Tests
// ============================================================================

#[tokio::test]
async fn test_float_timestamp_rejected() {
    let node = create_node("node-a");
    let err = node.insert(&json!({"s": [[0.5, 6]]})).await.unwrap_err();

    assert!(matches!(
        err,
        InsertError::Validation(ValidationError::InvalidTimestamp { .. })
    ));
    assert!(node.store().describe("s").await.is_none());
}

#[tokio::test]
async fn test_failed_insert_leaves_existing_series() {
    let node = create_node("node-a");
    node.insert(&json!({"s": [[1, 0]]})).await.unwrap();

    let err = node.insert(&json!({"": [[1, 0]]})).await.unwrap_err();
    assert_eq!(err, InsertError::Validation(ValidationError::EmptySeriesName));

    assert_eq!(node.store().read("s").await, vec![Point::integer(1, 0)]);
}

#[tokio::test]
async fn test_rejection_is_all_or_nothing() {
    let node = create_node("node-a");
    node.insert(&json!({"ints": [[1, 1]]})).await.unwrap();

    // Valid series "fresh" must not be created when "ints" is rejected
    let err = node
        .insert(&json!({"fresh": [[1, 0.5]], "ints": [[2, 2.5]]}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InsertError::Validation(ValidationError::TypeMismatch { .. })
    ));

    assert!(node.store().describe("fresh").await.is_none());
    assert_eq!(node.store().read("ints").await, vec![Point::integer(1, 1)]);
}

#[tokio::test]
async fn test_malformed_requests() {
    let node = create_node("node-a");

    for body in [
        json!("not a request"),
        json!(42),
        json!({"s": "points"}),
        json!([{"points": [[1, 1]]}]),
        json!({"c": []}),
    ] {
        assert!(node.insert(&body).await.is_err(), "accepted {body}");
    }
    assert!(node.store().is_empty().await);
}

// ============================================================================
// Bulk Insert Tests
// ============================================================================

#[tokio::test]
async fn test_bulk_shuffled_insert() {
    let node = create_node("node-a");
    let floats = shuffled_floats(10_000);
    let integers = shuffled_integers(10_000);

    let ack = node
        .insert(&json!({"f": points_json(&floats), "i": points_json(&integers)}))
        .await
        .unwrap();
    assert_eq!(ack.message(), "Inserted 20000 point(s) successfully.");

    let listing = node.store().list(&SeriesFilter::all()).await;
    assert_eq!(listing.len(), 2);

    let f = &listing[0];
    assert_eq!(f.name, "f");
    assert_eq!(f.length, 10_000);
    assert_eq!((f.start, f.end), (0, 9_999));
    assert_eq!(f.value_type, ValueType::Float);

    let i = &listing[1];
    assert_eq!(i.name, "i");
    assert_eq!(i.length, 10_000);
    assert_eq!((i.start, i.end), (0, 9_999));
    assert_eq!(i.value_type, ValueType::Integer);

    let stored = node.store().read("i").await;
    assert!(stored.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
}

#[tokio::test]
async fn test_duplicate_timestamp_last_write_wins() {
    let node = create_node("node-a");
    node.insert(&series_request("s", &[Point::integer(5, 1)]))
        .await
        .unwrap();
    node.insert(&series_request("s", &[Point::integer(5, 2)]))
        .await
        .unwrap();

    assert_eq!(node.store().read("s").await, vec![Point::integer(5, 2)]);
}

#[tokio::test]
async fn test_reinsert_is_idempotent() {
    let node = create_node("node-a");
    let points = shuffled_integers(100);
    let request = series_request("s", &points);

    node.insert(&request).await.unwrap();
    let before = node.store().describe("s").await.unwrap();
    node.insert(&request).await.unwrap();
    let after = node.store().describe("s").await.unwrap();

    assert_eq!(before, after);
}
