//! HTTP API tests against live members
//!
//! Two members are served on ephemeral ports; the second joins the pool of
//! the first through the API and is bootstrapped over HTTP.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use seriesdb::client::{ClientConfig, ClientError, SeriesDbClient};
use seriesdb::config::Config;
use seriesdb::models::Point;
use seriesdb::node::Node;
use seriesdb::replication::{MemberState, PoolStatus};
use seriesdb::server::SeriesDbServer;

use crate::common::{create_node, points_json, shuffled_integers};

/// Serve a fresh node on an ephemeral port
async fn start_member(id: &str) -> (SeriesDbClient, Arc<Node>) {
    let node = Arc::new(create_node(id));
    let mut config = Config::default();
    config.server.member_id = id.to_string();
    config.server.enable_request_logging = false;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let server = SeriesDbServer::with_node(config, node.clone());
    tokio::spawn(async move { server.serve(listener, std::future::pending()).await });

    let client = SeriesDbClient::new(ClientConfig::new(url)).unwrap();
    (client, node)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_insert_and_query_over_http() {
    let (client, _) = start_member("node-a").await;

    let response = client
        .insert(&json!({"cpu": [[2, 0.5], [1, 0.25]]}))
        .await
        .unwrap();
    assert_eq!(response.success_msg, "Inserted 2 point(s) successfully.");

    let points = client.query("cpu").await.unwrap();
    assert_eq!(points, vec![Point::float(1, 0.25), Point::float(2, 0.5)]);

    let err = client.insert(&json!({"s": [[0.5, 6]]})).await.unwrap_err();
    assert!(matches!(err, ClientError::Rejected(_)));

    let err = client.query("missing").await.unwrap_err();
    assert!(matches!(err, ClientError::Http { status: 404, .. }));

    let health = client.health().await.unwrap();
    assert_eq!(health.status, "healthy");
    assert_eq!(health.member, "node-a");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_member_joins_over_http() {
    let (origin, origin_node) = start_member("node-a").await;
    let (replica, replica_node) = start_member("node-b").await;

    origin
        .insert(&json!({"load": points_json(&shuffled_integers(500)), "temp": [[1, 21.5]]}))
        .await
        .unwrap();

    let info = origin
        .add_member("node-b", replica.base_url())
        .await
        .unwrap();
    assert_eq!(info.id, "node-b");

    origin_node
        .replication()
        .wait_until_running(Some(Duration::from_secs(3)))
        .await
        .unwrap();

    let report = origin.pool_status().await.unwrap();
    assert_eq!(report.status, PoolStatus::Running);
    assert_eq!(report.members[0].state, MemberState::Consistent);

    assert_eq!(
        origin.list_series().await.unwrap(),
        replica.list_series().await.unwrap()
    );
    assert_eq!(
        origin_node.store().read("load").await,
        replica_node.store().read("load").await
    );

    // New inserts are forwarded after the bootstrap
    origin.insert(&json!({"temp": [[2, 22.0]]})).await.unwrap();
    let forwarded = tokio::time::timeout(Duration::from_secs(3), async {
        while replica_node.store().read("temp").await.len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(forwarded.is_ok());
}
