//! Replica bootstrap and propagation tests
//!
//! Tests the lifecycle of a pool member:
//! 1. Bootstrap of existing series to a new replica
//! 2. Steady-state propagation in both directions
//! 3. Failure reporting through the pool status and resume

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use seriesdb::client::ClientConfig;
use seriesdb::models::Point;
use seriesdb::node::Node;
use seriesdb::replication::{HttpPeer, MemberState, PoolStatus, ReplicationError};
use seriesdb::storage::SeriesFilter;

use crate::common::{
    create_node, points_json, series_request, shuffled_floats, shuffled_integers,
};

const SETTLE: Duration = Duration::from_secs(3);

/// Wait until both nodes list identical series
async fn converged(a: &Node, b: &Node) -> bool {
    let wait = async {
        loop {
            let left = a.store().list(&SeriesFilter::all()).await;
            let right = b.store().list(&SeriesFilter::all()).await;
            if left == right {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    tokio::time::timeout(SETTLE, wait).await.is_ok()
}

async fn assert_same_series(a: &Node, b: &Node) {
    let names = a.store().names().await;
    assert_eq!(names, b.store().names().await);
    for name in names {
        assert_eq!(a.store().read(&name).await, b.store().read(&name).await, "series {name}");
    }
}

// ============================================================================
// Bootstrap Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_new_replica_converges() {
    let origin = create_node("node-a");
    origin
        .insert(&json!({
            "f": points_json(&shuffled_floats(2_000)),
            "i": points_json(&shuffled_integers(2_000)),
            "small": [[1, 1]]
        }))
        .await
        .unwrap();

    let replica = create_node("node-b");
    origin.add_replica(&replica).await.unwrap();

    origin
        .replication()
        .wait_until_running(Some(SETTLE))
        .await
        .unwrap();
    replica.replication().ensure_running().await.unwrap();

    assert_same_series(&origin, &replica).await;

    let member = origin.replication().pool().get("node-b").await.unwrap();
    assert_eq!(member.state, MemberState::Consistent);
    assert_eq!(member.series_transferred, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_inserts_during_bootstrap_reach_replica() {
    let origin = Arc::new(create_node("node-a"));
    for i in 0..20 {
        origin
            .insert(&series_request(&format!("s{i:02}"), &[Point::integer(i, i)]))
            .await
            .unwrap();
    }

    let replica = create_node("node-b");
    let writer = {
        let origin = origin.clone();
        tokio::spawn(async move {
            for ts in 100..200 {
                origin.insert(&json!({"s00": [[ts, ts]]})).await.unwrap();
            }
        })
    };
    origin.add_replica(&replica).await.unwrap();
    writer.await.unwrap();

    origin
        .replication()
        .wait_until_running(Some(SETTLE))
        .await
        .unwrap();
    assert!(converged(&origin, &replica).await);
    assert_same_series(&origin, &replica).await;
    assert_eq!(replica.store().read("s00").await.len(), 101);
}

// ============================================================================
// Propagation Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_inserts_flow_both_ways() {
    let a = create_node("node-a");
    let b = create_node("node-b");
    a.add_replica(&b).await.unwrap();
    a.replication().wait_until_running(Some(SETTLE)).await.unwrap();

    a.insert(&json!({"from_a": [[1, 0.5]]})).await.unwrap();
    b.insert(&json!({"from_b": [[2, 7]]})).await.unwrap();

    assert!(converged(&a, &b).await);
    assert_same_series(&a, &b).await;
    assert_eq!(a.store().names().await, vec!["from_a", "from_b"]);
}

#[tokio::test]
async fn test_duplicate_replica_rejected() {
    let a = create_node("node-a");
    let b = create_node("node-b");
    a.add_replica(&b).await.unwrap();

    let err = a.add_replica(&b).await.unwrap_err();
    assert_eq!(err, ReplicationError::DuplicateMember("node-b".to_string()));
    // b keeps its own link to a
    assert_eq!(b.replication().pool().members().await.len(), 1);
}

// ============================================================================
// Failure Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unreachable_member_degrades_pool() {
    let node = create_node("node-a");
    node.insert(&json!({"s": [[1, 1]]})).await.unwrap();

    let peer = HttpPeer::new(
        "node-down",
        ClientConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_millis(200)),
    )
    .unwrap();
    node.replication().add_member(Arc::new(peer)).await.unwrap();

    let mut status = node.replication().pool().subscribe();
    let degraded = tokio::time::timeout(
        SETTLE,
        status.wait_for(|s| *s == PoolStatus::Degraded),
    )
    .await
    .map(|r| r.is_ok());
    assert_eq!(degraded, Ok(true));

    let err = node
        .replication()
        .wait_until_running(Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, ReplicationError::BootstrapIncomplete { .. }));

    // Local inserts keep succeeding while the pool is degraded
    node.insert(&json!({"s": [[2, 2]]})).await.unwrap();
    assert_eq!(node.store().read("s").await.len(), 2);

    let member = node.replication().pool().get("node-down").await.unwrap();
    assert_eq!(member.state, MemberState::Failed);
    assert!(member.last_error.is_some());

    node.replication().remove_member("node-down").await.unwrap();
    assert_eq!(node.replication().status(), PoolStatus::Running);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_conflicting_series_does_not_block_replication() {
    let a = create_node("node-a");
    let b = create_node("node-b");
    a.add_replica(&b).await.unwrap();
    a.replication().wait_until_running(Some(SETTLE)).await.unwrap();

    // b already holds "x" as float, so a's integer "x" is refused there
    b.store().merge("x", &[Point::float(1, 0.5)]).await.unwrap();
    a.insert(&json!({"x": [[1, 1]]})).await.unwrap();
    a.insert(&json!({"y": [[1, 1]]})).await.unwrap();

    let arrived = tokio::time::timeout(SETTLE, async {
        while b.store().describe("y").await.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(arrived.is_ok());

    let member = a.replication().pool().get("node-b").await.unwrap();
    assert_eq!(member.state, MemberState::Failed);
    assert!(member.failures >= 1);
    assert!(member.last_error.is_some());
    assert_eq!(a.replication().status(), PoolStatus::Degraded);
    assert_eq!(b.store().read("x").await, vec![Point::float(1, 0.5)]);
}
