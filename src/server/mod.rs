//! HTTP surface: one generation route and a health probe

use crate::config::ServerConfig;
use crate::planning::{LecturePlan, LecturePlanPipeline, PlanRequest};
use crate::utils::errors::{GenerationError, LecternError};
use crate::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<LecturePlanPipeline>,
    default_audience: String,
    /// Parent of every request's cancellation token; cancelled on shutdown
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(pipeline: Arc<LecturePlanPipeline>, default_audience: impl Into<String>) -> Self {
        Self {
            pipeline,
            default_audience: default_audience.into(),
            shutdown: CancellationToken::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    category: &'static str,
    error_log: Vec<String>,
}

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
            category: "validation",
            error_log: Vec::new(),
        }
    }
}

impl From<GenerationError> for AppError {
    fn from(err: GenerationError) -> Self {
        let status = match &err {
            GenerationError::Allocation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            GenerationError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
            category: err.category(),
            error_log: err.error_log().to_vec(),
        }
    }
}

impl From<LecternError> for AppError {
    fn from(err: LecternError) -> Self {
        match err {
            LecternError::Generation(inner) => inner.into(),
            LecternError::Validation { .. } => Self::bad_request(err.to_string()),
            other => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: other.to_string(),
                category: other.category(),
                error_log: Vec::new(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "error": self.message,
            "category": self.category,
            "error_log": self.error_log,
        });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub topic: String,
    #[serde(default)]
    pub audience_level: Option<String>,
    /// Lecture length in hours
    pub duration: i64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub provider: String,
    pub model: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/lecture-plan/generate", post(generate_plan))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, server: &ServerConfig) -> Result<()> {
    let shutdown = state.shutdown.clone();
    let app = build_router(state);
    let addr = listen_address(server)?;

    info!("lectern serve listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;
    info!("lectern serve shut down");
    Ok(())
}

fn listen_address(server: &ServerConfig) -> Result<SocketAddr> {
    server
        .address()
        .parse()
        .map_err(|e| LecternError::validation("server.bind", format!("{}: {}", server.bind, e)))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    shutdown.cancel();
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider = state.pipeline.provider();
    Json(HealthResponse {
        status: "ok",
        provider: provider.provider_name().to_string(),
        model: provider.model().to_string(),
    })
}

async fn generate_plan(
    State(state): State<AppState>,
    payload: std::result::Result<Json<GenerateRequest>, JsonRejection>,
) -> std::result::Result<Json<LecturePlan>, AppError> {
    let Json(body) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;

    let audience = body
        .audience_level
        .filter(|a| !a.trim().is_empty())
        .unwrap_or_else(|| state.default_audience.clone());
    let request = PlanRequest::new(body.topic, Some(audience), body.duration)?;

    // Dropping this future on client disconnect drops the run with it
    let outcome = state
        .pipeline
        .run(request, state.shutdown.child_token())
        .await?;

    Ok(Json(outcome.plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::{is_outline_prompt, segment_of, ScriptedProvider};
    use crate::planning::PipelineConfig;
    use crate::utils::http::RetryConfig;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_router(outline: &'static str) -> Router {
        let provider = Arc::new(ScriptedProvider::new(move |prompt, _| {
            if is_outline_prompt(prompt) {
                Ok(outline.to_string())
            } else {
                Ok(serde_json::json!({
                    "details": [format!("notes on {}", segment_of(prompt).unwrap_or("?"))],
                    "concepts": ["one", "two", "three"]
                })
                .to_string())
            }
        }));
        let config = PipelineConfig {
            retry: RetryConfig::none(),
            ..PipelineConfig::default()
        };
        let pipeline = Arc::new(LecturePlanPipeline::new(provider, config));
        build_router(AppState::new(pipeline, "Undergraduate"))
    }

    const OUTLINE: &str = r#"{"title":"Graphs","total_minutes":40,"segments":[{"topic":"BFS","duration_mins":20},{"topic":"DFS","duration_mins":20}]}"#;

    fn post(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/lecture-plan/generate")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_generate_returns_plan() {
        let app = test_router(OUTLINE);

        let response = app
            .oneshot(post(r#"{"topic":"Graph Search","audience_level":"Graduate","duration":2}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let plan = json_body(response).await;
        assert_eq!(plan["title"], "Graph Search");
        assert_eq!(plan["audience_level"], "Graduate");
        assert_eq!(plan["duration_minutes"], 120);
        assert_eq!(plan["agenda"][0]["minutes"], 60);
        assert_eq!(plan["agenda"][1]["details"][0], "notes on DFS");
    }

    #[tokio::test]
    async fn test_missing_audience_uses_default() {
        let app = test_router(OUTLINE);
        let response = app
            .oneshot(post(r#"{"topic":"Graph Search","duration":1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["audience_level"], "Undergraduate");
    }

    #[tokio::test]
    async fn test_empty_topic_is_bad_request() {
        let app = test_router(OUTLINE);
        let response = app
            .oneshot(post(r#"{"topic":"  ","duration":1}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["category"], "validation");
        assert!(body["error"].as_str().unwrap().contains("topic"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = test_router(OUTLINE);
        let response = app.oneshot(post(r#"{"topic": 12}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_allocation_failure_is_unprocessable() {
        let app = test_router(r#"{"title":"Empty","total_minutes":0,"segments":[]}"#);
        let response = app
            .oneshot(post(r#"{"topic":"Nothing","duration":1}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(response).await;
        assert_eq!(body["category"], "allocation");
        assert!(body["error"].as_str().unwrap().contains("no segments to allocate"));
    }

    #[test]
    fn test_listen_address_from_config() {
        let server = ServerConfig {
            bind: "0.0.0.0".to_string(),
            port: 9000,
        };
        assert_eq!(listen_address(&server).unwrap(), "0.0.0.0:9000".parse::<SocketAddr>().unwrap());

        let bad = ServerConfig {
            bind: "not a host".to_string(),
            port: 9000,
        };
        let err = listen_address(&bad).unwrap_err();
        assert!(matches!(err, LecternError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_health_reports_provider() {
        let app = test_router(OUTLINE);
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["provider"], "scripted");
        assert_eq!(body["model"], "scripted-model");
    }
}
