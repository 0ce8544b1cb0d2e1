//! HTTP adapter for the publish pipeline
//!
//! # Routes
//!
//! - `GET /health` - Liveness check
//! - `GET /metrics` - Prometheus metrics
//! - `GET /api/updates?id=...` - One update
//! - `GET /api/updates?month=YYYY-MM` - Updates for a month (all when omitted)
//! - `POST /api/updates` - Create and publish an update
//! - `PUT /api/updates` - Retry platforms of an existing update
//! - `DELETE /api/updates?id=...` - Delete an update
//!
//! The caller is identified by the `x-user-id` header, falling back to the
//! default profile. Per-platform failures are reported inside a `200` response;
//! only malformed requests and storage failures produce error statuses.

use crate::config::DEFAULT_PROFILE;
use crate::metrics;
use crate::model::{CreateUpdateRequest, Month, RetryUpdateRequest};
use crate::publish::PublishOrchestrator;
use crate::RelayError;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Header carrying the caller's user id
pub const USER_HEADER: &str = "x-user-id";

/// Server error types
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bind error: {0}")]
    Bind(String),
}

/// Shared server state
pub struct AppState {
    pub orchestrator: PublishOrchestrator,
}

/// HTTP server for StatusRelay
pub struct RelayServer {
    state: Arc<AppState>,
    max_body_size: usize,
}

impl RelayServer {
    pub fn new(orchestrator: PublishOrchestrator, max_body_size: usize) -> Self {
        Self {
            state: Arc::new(AppState { orchestrator }),
            max_body_size,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/metrics", get(metrics_handler))
            .route(
                "/api/updates",
                get(read_updates)
                    .post(create_update)
                    .put(retry_update)
                    .delete(delete_update),
            )
            .layer(axum::extract::DefaultBodyLimit::max(self.max_body_size))
            .with_state(self.state.clone())
    }

    /// Run the server on the given address
    pub async fn run(self, addr: &str) -> Result<(), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind(e.to_string()))?;

        tracing::info!(
            addr = addr,
            max_body_size = self.max_body_size,
            "StatusRelay server listening"
        );

        axum::serve(listener, self.router())
            .await
            .map_err(ServerError::Io)
    }
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

/// Request-level failure rendered as JSON
pub struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(RelayError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::Validation(_) | RelayError::Parse(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "Request rejected");
        }
        (
            status,
            Json(ErrorResponse {
                success: false,
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn user_id(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_PROFILE)
        .to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdatesQuery {
    pub id: Option<String>,
    pub month: Option<String>,
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::encode_metrics(),
    )
}

async fn read_updates(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<UpdatesQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let uid = user_id(&headers);

    if let Some(id) = query.id.as_deref().filter(|id| !id.is_empty()) {
        let update = state.orchestrator.get(&uid, id)?;
        return Ok(Json(json!({ "success": true, "update": update })));
    }

    let month = query
        .month
        .as_deref()
        .filter(|m| !m.is_empty())
        .map(str::parse::<Month>)
        .transpose()?;
    let updates = state.orchestrator.list(&uid, month)?;
    Ok(Json(json!({ "success": true, "updates": updates })))
}

async fn create_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<CreateUpdateRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(request) = body?;
    let update = state.orchestrator.create(&user_id(&headers), request).await?;
    Ok(Json(json!({ "success": true, "update": update })))
}

async fn retry_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<RetryUpdateRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(request) = body?;
    let update = state.orchestrator.retry(&user_id(&headers), request).await?;
    Ok(Json(json!({ "success": true, "update": update })))
}

async fn delete_update(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<UpdatesQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RelayError::Validation("id is required".to_string()))?;
    state.orchestrator.delete(&user_id(&headers), &id)?;
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, JiraCredentials, PlatformConfig};
    use crate::integrations::jira::{WorklogError, WorklogRequest, WorklogSink};
    use crate::integrations::ChatPublisher;
    use crate::model::Platform;
    use crate::publish::PlatformClients;
    use crate::storage::SqliteUpdateStore;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::NaiveDate;
    use tower::ServiceExt;

    struct NoConfig;

    impl ConfigSource for NoConfig {
        fn platform_config(
            &self,
            _uid: &str,
            _platform: Platform,
        ) -> crate::Result<Option<PlatformConfig>> {
            Ok(None)
        }
    }

    struct Unused;

    #[async_trait]
    impl ChatPublisher for Unused {
        async fn publish(&self, _: &PlatformConfig, _: &str, _: NaiveDate) -> crate::Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl WorklogSink for Unused {
        async fn add_worklog(
            &self,
            _: &JiraCredentials,
            _: &str,
            _: &WorklogRequest,
        ) -> Result<String, WorklogError> {
            Ok("1".to_string())
        }
    }

    fn test_router() -> Router {
        let clients = PlatformClients {
            slack: Arc::new(Unused),
            teams: Arc::new(Unused),
            jira: Arc::new(Unused),
        };
        let orchestrator = PublishOrchestrator::new(
            Arc::new(SqliteUpdateStore::in_memory().unwrap()),
            Arc::new(NoConfig),
            clients,
        );
        RelayServer::new(orchestrator, 64 * 1024).router()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("Content-Type", "application/json")
            .header(USER_HEADER, "alice")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = test_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_reports_platform_failure_as_data() {
        let body = json!({
            "date": "2024-03-15",
            "rawTranscript": "worked on search",
            "slackOutput": "*TODAY:* search",
            "teamsOutput": "",
            "workLogEntries": [],
            "slackEnabled": true,
            "teamsEnabled": true,
            "jiraEnabled": false
        });
        let response = test_router()
            .oneshot(json_request("POST", "/api/updates", body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["success"], true);
        // no slack config for alice
        assert_eq!(json["update"]["slackStatus"], "FAILED");
        assert_eq!(json["update"]["teamsStatus"], "SKIPPED");
        assert_eq!(json["update"]["jiraStatus"], "SKIPPED");
        assert_eq!(json["update"]["userId"], "alice");
    }

    #[tokio::test]
    async fn test_retry_without_id_is_bad_request() {
        let response = test_router()
            .oneshot(json_request("PUT", "/api/updates", json!({ "retrySlack": true })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["success"], false);
        assert!(json["error"].as_str().unwrap().contains("updateId"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/updates")
            .header("Content-Type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/updates?id=missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bad_month_is_bad_request() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/updates?month=2024-3")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_delete_requires_id() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/updates")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_and_delete_round() {
        let router = test_router();
        let body = json!({
            "date": "2024-03-15",
            "slackOutput": "",
            "teamsOutput": "",
            "slackEnabled": false,
            "teamsEnabled": false,
            "jiraEnabled": false
        });
        let created = body_json(
            router
                .clone()
                .oneshot(json_request("POST", "/api/updates", body))
                .await
                .unwrap(),
        )
        .await;
        let id = created["update"]["id"].as_str().unwrap().to_string();

        let listed = body_json(
            router
                .clone()
                .oneshot(
                    Request::builder()
                        .uri("/api/updates?month=2024-03")
                        .header(USER_HEADER, "alice")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(listed["updates"].as_array().unwrap().len(), 1);

        let response = router
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/updates?id={}", id))
                    .header(USER_HEADER, "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let response = test_router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
