//! Concurrent writer tests
//!
//! Many tasks insert into a shared set of series at the same time; the
//! stored result must equal the union of every contribution.

use std::sync::Arc;

use futures::future::join_all;
use rand::seq::SliceRandom;
use serde_json::{Map, Value};

use seriesdb::models::{Point, Value as PointValue};
use seriesdb::storage::SeriesFilter;

use crate::common::{create_node, points_json, series_request, shuffled_floats};

const WRITERS: i64 = 25;
const SERIES: [&str; 5] = ["cpu", "disk", "load", "mem", "net"];
const POINTS_PER_SERIES: i64 = 200;

/// Points of one writer for one series; writers never share a timestamp
fn contribution(writer: i64) -> Vec<Point> {
    let base = writer * POINTS_PER_SERIES;
    let mut points: Vec<Point> = (base..base + POINTS_PER_SERIES)
        .map(|ts| Point::integer(ts, writer))
        .collect();
    points.shuffle(&mut rand::thread_rng());
    points
}

fn request(writer: i64) -> Value {
    let mut body = Map::new();
    for name in SERIES {
        body.insert(name.to_string(), points_json(&contribution(writer)));
    }
    Value::Object(body)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writers_lose_no_updates() {
    let node = Arc::new(create_node("node-a"));

    let tasks = (0..WRITERS).map(|writer| {
        let node = node.clone();
        tokio::spawn(async move { node.insert(&request(writer)).await })
    });

    for result in join_all(tasks).await {
        let ack = result.unwrap().unwrap();
        assert_eq!(ack.points as i64, POINTS_PER_SERIES * SERIES.len() as i64);
    }

    let total = WRITERS * POINTS_PER_SERIES;
    let listing = node.store().list(&SeriesFilter::all()).await;
    assert_eq!(listing.len(), SERIES.len());

    for info in listing {
        assert_eq!(info.length as i64, total, "series {}", info.name);
        assert_eq!((info.start, info.end), (0, total - 1));

        let points = node.store().read(&info.name).await;
        for (ts, point) in points.iter().enumerate() {
            assert_eq!(point.timestamp, ts as i64);
            assert_eq!(point.value, PointValue::Integer(ts as i64 / POINTS_PER_SERIES));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_split_batches_match_single_insert() {
    let sequential = create_node("node-a");
    let concurrent = Arc::new(create_node("node-b"));

    let points = shuffled_floats(1_000);
    sequential
        .insert(&series_request("s", &points))
        .await
        .unwrap();

    let tasks = points.chunks(100).map(|chunk| {
        let node = concurrent.clone();
        let body = series_request("s", chunk);
        tokio::spawn(async move { node.insert(&body).await })
    });
    for result in join_all(tasks).await {
        result.unwrap().unwrap();
    }

    assert_eq!(
        sequential.store().read("s").await,
        concurrent.store().read("s").await
    );
    assert_eq!(
        sequential.store().describe("s").await,
        concurrent.store().describe("s").await
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conflicting_types_race() {
    let node = Arc::new(create_node("node-a"));

    let tasks = (0..10).map(|i| {
        let node = node.clone();
        let body = if i % 2 == 0 {
            serde_json::json!({"s": [[i, 1]]})
        } else {
            serde_json::json!({"s": [[i, 0.5]]})
        };
        tokio::spawn(async move { node.insert(&body).await })
    });

    let accepted = join_all(tasks)
        .await
        .into_iter()
        .filter(|r| matches!(r, Ok(Ok(_))))
        .count();

    // Whichever kind won the race, only that kind was stored
    let info = node.store().describe("s").await.unwrap();
    assert_eq!(info.length, accepted);
    assert_eq!(accepted, 5);
    let points = node.store().read("s").await;
    assert!(points.iter().all(|p| p.value.value_type() == info.value_type));
}
