//! HTTP handler for the continual policy service
//!
//! - `routes`: the request surface and error mapping
//! - `middleware`: request ids and request logging
//!
//! Successful responses carry the operation's own JSON shape. Failures use a
//! common envelope with a stable error code and request metadata.

pub mod middleware;
pub mod routes;

pub use middleware::{request_id_middleware, request_logging_middleware, RequestId};
pub use routes::{create_router, ApiError, AppState};

use serde::{Deserialize, Serialize};

/// Error envelope returned on every failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    pub error: ErrorInfo,
    pub metadata: ResponseMetadata,
}

impl ErrorResponse {
    pub fn new(error: ErrorInfo, request_id: String) -> Self {
        Self {
            success: false,
            error,
            metadata: ResponseMetadata::new(request_id),
        }
    }
}

/// Error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Response metadata for tracing and debugging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub request_id: String,
    /// ISO 8601
    pub timestamp: String,
    pub version: String,
}

impl ResponseMetadata {
    pub fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Body of `/route_and_respond` and `/respond_go_mode`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub user_query: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// Body of `/solve_and_learn`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRequest {
    pub problem: String,
    pub repo_path: String,
    pub reference_solution: String,
}

/// Body of `/rollback_policy`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackRequest {
    pub version_index: usize,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    /// Committed policy versions, absent when the store cannot be read
    pub policy_versions: Option<usize>,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response() {
        let error = ErrorInfo::new("VERSION_NOT_FOUND", "Policy version 7 not found")
            .with_details(serde_json::json!({"index": 7}));
        let response = ErrorResponse::new(error, "req-456".to_string());

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["success"], false);
        assert_eq!(value["error"]["code"], "VERSION_NOT_FOUND");
        assert_eq!(value["error"]["details"]["index"], 7);
        assert_eq!(value["metadata"]["request_id"], "req-456");
    }

    #[test]
    fn test_query_request_context_optional() {
        let request: QueryRequest =
            serde_json::from_str(r#"{"user_query": "build a cli"}"#).unwrap();
        assert!(request.context.is_none());
    }
}
