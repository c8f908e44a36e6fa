//! REST API handlers
//!
//! Successful inserts answer `{"success_msg": ...}`, rejected ones answer
//! 400 with `{"error_msg": ...}`. Every other error body uses the same
//! `error_msg` shape.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::client::{AddMemberRequest, ClientConfig, HealthResponse};
use crate::insert::{ErrorResponse, InsertResponse};
use crate::metrics;
use crate::replication::{HttpPeer, ReplicatedAck, ReplicatedBatch, ReplicationError};
use crate::storage::SeriesFilter;

use super::AppState;

// ============================================================================
// Query Parameters
// ============================================================================

/// Query of `GET /series`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    /// Filter expression, e.g. `length > 10 and type == float`
    pub filter: Option<String>,
}

/// Query of `GET /series/{name}`: `start <= timestamp < end`
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

// ============================================================================
// Router
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/insert", post(insert))
        .route("/series", get(list_series))
        .route("/series/{name}", get(query_series))
        .route("/pool/members", post(add_member))
        .route("/pool/members/{id}", delete(remove_member))
        .route("/pool/members/{id}/resume", post(resume_member))
        .route("/pool/status", get(pool_status))
        .route("/replication/apply", post(apply_replicated))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

fn replication_status(err: &ReplicationError) -> StatusCode {
    match err {
        ReplicationError::DuplicateMember(_) | ReplicationError::PoolFull { .. } => {
            StatusCode::CONFLICT
        }
        ReplicationError::UnknownMember(_) => StatusCode::NOT_FOUND,
        ReplicationError::InvalidAddress { .. } => StatusCode::BAD_REQUEST,
        ReplicationError::BootstrapIncomplete { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn replication_error(err: ReplicationError) -> Response {
    error_response(replication_status(&err), err.to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /insert
async fn insert(State(state): State<AppState>, body: Bytes) -> Response {
    match state.node.inserts().insert_slice(&body).await {
        Ok(ack) => (StatusCode::OK, Json(InsertResponse::from(ack))).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(ErrorResponse::from(&e))).into_response(),
    }
}

/// GET /series
async fn list_series(State(state): State<AppState>, Query(query): Query<ListQuery>) -> Response {
    let filter = match query.filter.as_deref().map(str::parse::<SeriesFilter>) {
        None => SeriesFilter::all(),
        Some(Ok(filter)) => filter,
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    Json(state.node.store().list(&filter).await).into_response()
}

/// GET /series/{name}
async fn query_series(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(range): Query<RangeQuery>,
) -> Response {
    let store = state.node.store();
    if store.describe(&name).await.is_none() {
        return error_response(StatusCode::NOT_FOUND, format!("Unknown series: '{}'", name));
    }

    Json(store.read_range(&name, range.start, range.end).await).into_response()
}

/// POST /pool/members
async fn add_member(
    State(state): State<AppState>,
    Json(request): Json<AddMemberRequest>,
) -> Response {
    let replication = state.node.replication();
    let client = ClientConfig::new(&request.url)
        .with_timeout(replication.config().peer_timeout())
        .with_retry(replication.config().retry_config());

    let peer = match HttpPeer::new(&request.id, client) {
        Ok(peer) => Arc::new(peer),
        Err(e) => return replication_error(e),
    };

    let added = if request.synced {
        replication.add_synced_member(peer).await
    } else {
        replication.add_member(peer).await
    };

    match added {
        Ok(info) => (StatusCode::CREATED, Json(info)).into_response(),
        Err(e) => replication_error(e),
    }
}

/// DELETE /pool/members/{id}
async fn remove_member(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.node.replication().remove_member(&id).await {
        Ok(info) => Json(info).into_response(),
        Err(e) => replication_error(e),
    }
}

/// POST /pool/members/{id}/resume
async fn resume_member(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.node.replication().resume_bootstrap(&id).await {
        Ok(info) => Json(info).into_response(),
        Err(e) => replication_error(e),
    }
}

/// GET /pool/status
async fn pool_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.node.replication().report().await)
}

/// POST /replication/apply
async fn apply_replicated(
    State(state): State<AppState>,
    Json(batch): Json<ReplicatedBatch>,
) -> Response {
    match state.node.inserts().apply_replicated(&batch).await {
        Ok(applied) => Json(ReplicatedAck { applied }).into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// GET /health
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.node.replication().status();
    let status = if pool.is_running() {
        "healthy".to_string()
    } else {
        pool.to_string()
    };

    Json(HealthResponse {
        status,
        member: state.node.id().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
async fn metrics_handler() -> Response {
    match metrics::encode_metrics() {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{Point, SeriesInfo, ValueType};
    use crate::replication::{PoolReport, PoolStatus};
    use crate::server::SeriesDbServer;
    use axum::body::Body;
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    fn router() -> (Router, AppState) {
        let server = SeriesDbServer::new(Config::default()).unwrap();
        (server.build_router(), server.state())
    }

    async fn call(router: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body)
    }

    fn decode<T: DeserializeOwned>(body: &Bytes) -> T {
        serde_json::from_slice(body).unwrap()
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_insert_success() {
        let (router, state) = router();
        let (status, body) = call(&router, post("/insert", r#"{"cpu": [[1, 0.5], [2, 0.7]]}"#)).await;

        assert_eq!(status, StatusCode::OK);
        let response: InsertResponse = decode(&body);
        assert_eq!(response.success_msg, "Inserted 2 point(s) successfully.");
        assert_eq!(state.node.store().total_points().await, 2);
    }

    #[tokio::test]
    async fn test_insert_rejected() {
        let (router, state) = router();
        let (status, body) = call(&router, post("/insert", r#"{"cpu": [[1.5, 0]]}"#)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let response: ErrorResponse = decode(&body);
        assert!(!response.error_msg.is_empty());
        assert!(state.node.store().is_empty().await);

        let (status, _) = call(&router, post("/insert", "not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_series() {
        let (router, _) = router();
        call(&router, post("/insert", r#"{"load": [[3, 3], [1, 1], [2, 2]]}"#)).await;

        let (status, body) = call(&router, get("/series/load")).await;
        assert_eq!(status, StatusCode::OK);
        let points: Vec<Point> = decode(&body);
        assert_eq!(
            points,
            vec![Point::integer(1, 1), Point::integer(2, 2), Point::integer(3, 3)]
        );

        let (_, body) = call(&router, get("/series/load?start=2&end=3")).await;
        let points: Vec<Point> = decode(&body);
        assert_eq!(points, vec![Point::integer(2, 2)]);

        let (status, body) = call(&router, get("/series/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: ErrorResponse = decode(&body);
        assert!(error.error_msg.contains("missing"));
    }

    #[tokio::test]
    async fn test_list_series_with_filter() {
        let (router, _) = router();
        call(&router, post("/insert", r#"{"a": [[1, 1]], "b": [[1, 0.5], [2, 0.5]]}"#)).await;

        let (_, body) = call(&router, get("/series")).await;
        let all: Vec<SeriesInfo> = decode(&body);
        assert_eq!(all.len(), 2);

        let (status, body) = call(&router, get("/series?filter=type%20%3D%3D%20float")).await;
        assert_eq!(status, StatusCode::OK);
        let floats: Vec<SeriesInfo> = decode(&body);
        assert_eq!(floats.len(), 1);
        assert_eq!(floats[0].name, "b");
        assert_eq!(floats[0].value_type, ValueType::Float);

        let (status, _) = call(&router, get("/series?filter=color%20%3D%3D%20red")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_apply_replicated() {
        let (router, state) = router();
        let body = r#"{"origin": "node-b", "sequence": 1,
            "series": [{"name": "cpu", "value_type": "float", "points": [[1, 0.5]]}]}"#;

        let (status, _) = call(&router, post("/replication/apply", body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.node.store().read("cpu").await, vec![Point::float(1, 0.5)]);

        let conflicting = r#"{"origin": "node-b", "sequence": 2,
            "series": [{"name": "cpu", "value_type": "integer", "points": [[2, 1]]}]}"#;
        let (status, _) = call(&router, post("/replication/apply", conflicting)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mislabelled = r#"{"origin": "node-b", "sequence": 3,
            "series": [{"name": "s", "value_type": "integer", "points": [[1, 0.5], [2, 3]]}]}"#;
        let (status, _) = call(&router, post("/replication/apply", mislabelled)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.node.store().describe("s").await.is_none());
    }

    #[tokio::test]
    async fn test_pool_membership_routes() {
        let (router, _) = router();

        let (status, _) = call(
            &router,
            post("/pool/members", r#"{"id": "node-b", "url": "ftp://node-b"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &router,
            post("/pool/members", r#"{"id": "node-b", "url": "http://127.0.0.1:1", "synced": true}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call(
            &router,
            post("/pool/members", r#"{"id": "node-b", "url": "http://127.0.0.1:1", "synced": true}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (_, body) = call(&router, get("/pool/status")).await;
        let report: PoolReport = decode(&body);
        assert_eq!(report.members.len(), 1);
        assert_eq!(report.status, PoolStatus::Running);

        let request = Request::delete("/pool/members/node-b")
            .body(Body::empty())
            .unwrap();
        let (status, _) = call(&router, request).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&router, post("/pool/members/node-b/resume", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_check() {
        let (router, _) = router();
        let (status, body) = call(&router, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        let health: HealthResponse = decode(&body);
        assert_eq!(health.status, "healthy");
        assert_eq!(health.member, "seriesdb-0");
    }

    #[test]
    fn test_replication_status_mapping() {
        assert_eq!(
            replication_status(&ReplicationError::PoolFull { max: 2 }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            replication_status(&ReplicationError::UnknownMember("x".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            replication_status(&ReplicationError::transient("x", "down")),
            StatusCode::BAD_GATEWAY
        );
    }
}
