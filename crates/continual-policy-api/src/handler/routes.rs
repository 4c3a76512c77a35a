//! Route definitions for the continual policy service
//!
//! - POST /route_and_respond - Classify, then answer under the routed contract
//! - POST /respond_go_mode - Answer under the general response contract
//! - POST /solve_and_learn - One learning cycle
//! - POST /get_policy_latest - Active learned policy
//! - POST /rollback_policy - Re-point the active policy
//! - GET /policies - Committed versions
//! - GET /health - Health check endpoint
//! - GET /metrics - Prometheus exposition

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use continual_policy_core::{
    CoreError, LatestPolicy, LearningOutcome, PolicyService, PolicyVersionSummary,
    RollbackReport, RouteOutcome,
};

use super::middleware::{request_id_middleware, request_logging_middleware, RequestId};
use super::{
    ErrorInfo, ErrorResponse, HealthResponse, HealthStatus, QueryRequest, RollbackRequest,
    SolveRequest,
};
use crate::error::ServiceError;
use crate::telemetry::MetricsRegistry;

/// Handler state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PolicyService>,
    pub metrics: MetricsRegistry,
    /// Start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(service: Arc<PolicyService>, metrics: MetricsRegistry) -> Self {
        Self {
            service,
            metrics,
            start_time: Instant::now(),
        }
    }
}

/// API error rendered as the error envelope
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<Value>,
    request_id: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
            request_id: None,
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Stamp the envelope with the caller's request id
    pub fn for_request(mut self, request_id: &RequestId) -> Self {
        self.request_id = Some(request_id.0.clone());
        self
    }

    pub fn error_code(&self) -> &'static str {
        self.code
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let status = match &err {
            CoreError::ContractViolation { .. } | CoreError::InvalidRuleSet(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CoreError::VersionNotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Model(_) | CoreError::Collaborator { .. } => StatusCode::BAD_GATEWAY,
            CoreError::CollaboratorTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            CoreError::UnknownContract(_)
            | CoreError::SchemaUnavailable { .. }
            | CoreError::Storage(_)
            | CoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let details = match &err {
            CoreError::ContractViolation {
                contract_id,
                attempts,
                details,
            } => Some(json!({
                "contract_id": contract_id,
                "attempts": attempts,
                "details": details,
            })),
            CoreError::VersionNotFound { index, available } => {
                Some(json!({"index": index, "available": available}))
            }
            CoreError::CollaboratorTimeout {
                collaborator,
                timeout_ms,
            } => Some(json!({"collaborator": collaborator, "timeout_ms": timeout_ms})),
            _ => None,
        };

        let error = ApiError::new(status, err.code(), err.to_string());
        match details {
            Some(details) => error.with_details(details),
            None => error,
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Core(core) => core.into(),
            ServiceError::InvalidInput(msg) => ApiError::bad_request(msg),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        if status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "Request failed");
        } else {
            tracing::debug!(code = self.code, message = %self.message, "Request rejected");
        }

        let mut error_info = ErrorInfo::new(self.code, self.message);
        if let Some(details) = self.details {
            error_info = error_info.with_details(details);
        }
        let request_id = self
            .request_id
            .unwrap_or_else(|| RequestId::generate().0);

        (status, Json(ErrorResponse::new(error_info, request_id))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Contract-enforced responders
        .route("/route_and_respond", post(route_and_respond))
        .route("/respond_go_mode", post(respond_go_mode))
        // Learning and policy management
        .route("/solve_and_learn", post(solve_and_learn))
        .route("/get_policy_latest", post(get_policy_latest))
        .route("/rollback_policy", post(rollback_policy))
        .route("/policies", get(list_policies))
        // Operational endpoints
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(from_fn(request_logging_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST /route_and_respond
///
/// A contract violation is reported in the body with status 200.
pub async fn route_and_respond(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<RouteOutcome> {
    let Json(request) = payload.map_err(|e| ApiError::from(e).for_request(&request_id))?;
    let outcome = state
        .service
        .route_and_respond(&request.user_query, request.context.as_deref())
        .await
        .map_err(|e| ApiError::from(e).for_request(&request_id))?;
    Ok(Json(outcome))
}

/// POST /respond_go_mode
pub async fn respond_go_mode(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(request) = payload.map_err(|e| ApiError::from(e).for_request(&request_id))?;
    let output = state
        .service
        .respond_go_mode(&request.user_query, request.context.as_deref())
        .await
        .map_err(|e| ApiError::from(e).for_request(&request_id))?;
    Ok(Json(output))
}

/// POST /solve_and_learn
pub async fn solve_and_learn(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<SolveRequest>, JsonRejection>,
) -> ApiResult<LearningOutcome> {
    let Json(request) = payload.map_err(|e| ApiError::from(e).for_request(&request_id))?;
    if request.repo_path.trim().is_empty() {
        return Err(ApiError::bad_request("repo_path must not be empty").for_request(&request_id));
    }

    let outcome = state
        .service
        .solve_and_learn(
            &request.problem,
            &PathBuf::from(&request.repo_path),
            &request.reference_solution,
        )
        .await
        .map_err(|e| ApiError::from(e).for_request(&request_id))?;
    Ok(Json(outcome))
}

/// POST /get_policy_latest - the body, if any, is ignored
pub async fn get_policy_latest(
    State(state): State<AppState>,
    request_id: RequestId,
) -> ApiResult<LatestPolicy> {
    let latest = state
        .service
        .get_policy_latest()
        .await
        .map_err(|e| ApiError::from(e).for_request(&request_id))?;
    Ok(Json(latest))
}

/// POST /rollback_policy
pub async fn rollback_policy(
    State(state): State<AppState>,
    request_id: RequestId,
    payload: Result<Json<RollbackRequest>, JsonRejection>,
) -> ApiResult<RollbackReport> {
    let Json(request) = payload.map_err(|e| ApiError::from(e).for_request(&request_id))?;
    let report = state
        .service
        .rollback_policy(request.version_index)
        .await
        .map_err(|e| ApiError::from(e).for_request(&request_id))?;
    Ok(Json(report))
}

/// GET /policies
pub async fn list_policies(
    State(state): State<AppState>,
    request_id: RequestId,
) -> ApiResult<Vec<PolicyVersionSummary>> {
    let versions = state
        .service
        .list_policies()
        .await
        .map_err(|e| ApiError::from(e).for_request(&request_id))?;
    Ok(Json(versions))
}

/// GET /health
///
/// Degraded when the policy store cannot be read.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let policy_versions = match state.service.store().len().await {
        Ok(count) => Some(count),
        Err(e) => {
            tracing::warn!(error = %e, "Policy store unreadable during health check");
            None
        }
    };

    Json(HealthResponse {
        status: if policy_versions.is_some() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        policy_versions,
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
pub async fn metrics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let body = state.metrics.render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response())
}
