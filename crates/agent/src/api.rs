//! HTTP API for container queries, health checks and Prometheus metrics

use agent_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::{AgentMetrics, StructuredLogger},
    AccessLog, AgentError, QueryEngine, ResourceLimits,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub query: QueryEngine,
    pub health_registry: HealthRegistry,
    pub metrics: AgentMetrics,
    pub logger: StructuredLogger,
    pub access_log: AccessLog,
    pub token: String,
    pub version: String,
}

impl AppState {
    pub fn new(
        query: QueryEngine,
        health_registry: HealthRegistry,
        access_log: AccessLog,
        token: impl Into<String>,
    ) -> Self {
        Self {
            query,
            health_registry,
            metrics: AgentMetrics::new(),
            logger: StructuredLogger::new("metrics-agent"),
            access_log,
            token: token.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }
}

/// Error body returned by every handler
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<AgentError> for ApiError {
    fn from(err: AgentError) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

#[derive(Debug, Default, Deserialize)]
struct FilterParams {
    filter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DomainParams {
    domain: Option<String>,
}

impl DomainParams {
    fn domain(&self) -> Option<&str> {
        self.domain.as_deref().filter(|d| !d.is_empty())
    }
}

/// Whether an `Authorization` value carries the token, with or without the
/// `Bearer ` scheme
fn token_matches(header_value: &str, token: &str) -> bool {
    header_value.strip_prefix("Bearer ").unwrap_or(header_value) == token
}

/// Rejects requests without the configured bearer token
async fn require_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = match request.headers().get(header::AUTHORIZATION) {
        Some(value) => value
            .to_str()
            .map(|v| token_matches(v, &state.token))
            .unwrap_or(false),
        None => return ApiError::unauthorized("missing authorization header").into_response(),
    };

    if !authorized {
        return ApiError::unauthorized("invalid token").into_response();
    }
    next.run(request).await
}

/// Liveness summary
async fn api_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.health_registry.status(&state.version))
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_containers(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
) -> ApiResult<serde_json::Value> {
    let containers = state.query.list_containers(params.filter.as_deref()).await?;
    Ok(Json(json!({ "containers": containers })))
}

async fn container_stats(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<agent_lib::ContainerStats> {
    Ok(Json(state.query.current_stats(&id).await?))
}

async fn container_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<agent_lib::ResolvedHistory> {
    Ok(Json(state.query.history(&id).await))
}

async fn container_overview(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<DomainParams>,
) -> ApiResult<agent_lib::ContainerOverview> {
    let requests = match params.domain() {
        Some(domain) => match state.access_log.count(domain).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                debug!(path = %state.access_log.path().display(), error = %e, "Access log unreadable");
                None
            }
        },
        None => None,
    };

    Ok(Json(state.query.overview(&id, requests).await?))
}

async fn update_limits(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: std::result::Result<Json<ResourceLimits>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let Json(limits) = body.map_err(|e| ApiError::bad_request(format!("invalid request body: {}", e.body_text())))?;
    let requested = limits.to_update();

    match state.query.set_limits(&id, limits).await {
        Ok(applied) => {
            state.metrics.inc_limit_updates();
            state
                .logger
                .log_limits_update(&id, applied.nano_cpus, applied.memory_bytes, true);
            Ok(Json(json!({
                "success": true,
                "container_id": id,
                "limits": limits,
            })))
        }
        Err(e) => {
            state
                .logger
                .log_limits_update(&id, requested.nano_cpus, requested.memory_bytes, false);
            Err(e.into())
        }
    }
}

async fn all_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FilterParams>,
) -> ApiResult<agent_lib::AllStats> {
    Ok(Json(state.query.all_stats(params.filter.as_deref()).await?))
}

async fn request_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DomainParams>,
) -> ApiResult<agent_lib::RequestStats> {
    let domain = params
        .domain()
        .ok_or_else(|| ApiError::bad_request("domain parameter required"))?;

    match state.access_log.count(domain).await {
        Ok(stats) => Ok(Json(stats)),
        Err(e) => {
            warn!(path = %state.access_log.path().display(), error = %e, "Access log unreadable, reporting zero requests");
            Ok(Json(agent_lib::RequestStats::empty(domain)))
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/containers", get(list_containers))
        .route("/api/containers/:id/stats", get(container_stats))
        .route("/api/containers/:id/history", get(container_history))
        .route("/api/containers/:id/all", get(container_overview))
        .route("/api/containers/:id/limits", post(update_limits))
        .route("/api/stats", get(all_stats))
        .route("/api/requests", get(request_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token));

    Router::new()
        .route("/api/health", get(api_health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .merge(protected)
        .with_state(state)
}

/// Start the API server
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    Ok(())
}
