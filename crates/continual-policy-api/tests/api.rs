//! HTTP surface tests
//!
//! The router is exercised in-process with `oneshot`, backed by a scripted
//! model, a canned test runner and an in-memory policy store.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

use continual_policy_api::{create_router, AppState, MetricsRegistry};
use continual_policy_core::{
    ContractRegistry, CoreConfig, InMemoryPolicyStore, ModelError, ModelInvoker, PolicyRuleSet,
    PolicyService, PolicyStore, ServiceParts, TestRunner, TextSource,
};

struct ScriptedModel {
    responses: Mutex<VecDeque<Value>>,
}

impl ScriptedModel {
    fn new(responses: Vec<Value>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }
}

#[async_trait]
impl ModelInvoker for ScriptedModel {
    async fn invoke(&self, _system: &str, _user: &str) -> Result<Value, ModelError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ModelError::Unavailable("script exhausted".to_string()))
    }
}

struct PassingTests;

#[async_trait]
impl TestRunner for PassingTests {
    async fn run(&self, _code_location: &Path) -> continual_policy_core::Result<Value> {
        Ok(json!({"command": "cargo test", "passed": true, "exit_code": 0}))
    }
}

struct TestApp {
    router: Router,
    store: Arc<InMemoryPolicyStore>,
}

fn app(responses: Vec<Value>) -> TestApp {
    let store = Arc::new(InMemoryPolicyStore::new());
    let metrics = MetricsRegistry::new().unwrap();
    let parts = ServiceParts {
        registry: ContractRegistry::embedded(),
        model: ScriptedModel::new(responses),
        test_runner: Arc::new(PassingTests),
        store: store.clone(),
        base_policy: TextSource::Inline("Keep functions small.".to_string()),
        coder_template: TextSource::Inline(
            "{{BASE_POLICY}}\n{{LEARNED_POLICY}}\n{{PROBLEM}}".to_string(),
        ),
    };
    let service = PolicyService::assemble(parts, &CoreConfig::default())
        .unwrap()
        .with_metrics(metrics.metrics());

    TestApp {
        router: create_router(AppState::new(Arc::new(service), metrics)),
        store,
    }
}

fn go_mode_response() -> Value {
    json!({
        "summary": "Use axum",
        "answer": "axum composes with tower middleware.",
        "assumptions": ["HTTP/1.1 is enough"],
        "follow_ups": ["Need websockets?", "Deploying behind a proxy?"]
    })
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_route_and_respond_valid() {
    let app = app(vec![json!({"answer": "incomplete"}), go_mode_response()]);

    let (status, body) = send(
        &app.router,
        post("/route_and_respond", json!({"user_query": "axum vs actix, which is better?"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["route"], json!({"task_type": "decision", "contract_id": "go_mode_response"}));
    assert_eq!(body["output"], go_mode_response());
}

#[tokio::test]
async fn test_route_and_respond_violation_is_ok_status() {
    let app = app(vec![json!({}), json!({}), json!({})]);

    let (status, body) = send(
        &app.router,
        post(
            "/route_and_respond",
            json!({"user_query": "implement a cli", "context": "rust 1.75"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["route"]["contract_id"], "go_mode_code");
    assert_eq!(body["error"], "CONTRACT_VIOLATION");
    assert_eq!(body["attempts"], 3);
    assert!(body["details"].is_string());
    assert!(body.get("output").is_none());
}

#[tokio::test]
async fn test_respond_go_mode_violation_is_unprocessable() {
    // One scripted response: a retry would exhaust the script and surface as 502.
    let app = app(vec![json!([])]);

    let (status, body) = send(
        &app.router,
        post("/respond_go_mode", json!({"user_query": "explain lifetimes"})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CONTRACT_VIOLATION");
    assert_eq!(body["error"]["details"]["contract_id"], "go_mode_response");
    assert_eq!(body["error"]["details"]["attempts"], 1);
}

#[tokio::test]
async fn test_model_failure_is_bad_gateway() {
    let app = app(vec![]);

    let (status, body) = send(
        &app.router,
        post("/respond_go_mode", json!({"user_query": "explain lifetimes"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "MODEL_ERROR");
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = app(vec![]);

    let (status, body) = send(&app.router, post("/rollback_policy", json!({"index": "one"}))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_policy_latest_and_rollback() {
    let app = app(vec![]);

    let (status, body) = send(&app.router, post("/get_policy_latest", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"path": null, "policy": null}));

    for n in 0..3 {
        app.store
            .commit(&PolicyRuleSet::new(json!({"summary": format!("v{}", n)})))
            .await
            .unwrap();
    }

    let (status, body) = send(
        &app.router,
        post("/rollback_policy", json!({"version_index": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rolled_back_to"], 1);
    assert_eq!(body["path"], "memory://policies/v1");
    assert!(body["policy"].as_str().unwrap().contains("v1"));

    let (_, latest) = send(&app.router, post("/get_policy_latest", json!({}))).await;
    assert_eq!(latest["path"], "memory://policies/v1");

    let (status, versions) = send(&app.router, get("/policies")).await;
    assert_eq!(status, StatusCode::OK);
    let versions = versions.as_array().unwrap();
    assert_eq!(versions.len(), 3);
    assert_eq!(versions[1]["active"], true);
    assert_eq!(versions[2]["active"], false);
}

#[tokio::test]
async fn test_rollback_out_of_range_is_not_found() {
    let app = app(vec![]);
    app.store
        .commit(&PolicyRuleSet::new(json!({"summary": "only"})))
        .await
        .unwrap();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/rollback_policy")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-request-id", "rollback-1")
        .body(Body::from(json!({"version_index": 5}).to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "rollback-1");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "VERSION_NOT_FOUND");
    assert_eq!(body["error"]["details"], json!({"index": 5, "available": 1}));
    assert_eq!(body["metadata"]["request_id"], "rollback-1");

    let latest = app.store.latest().await.unwrap().unwrap();
    assert_eq!(latest.index, 0);
}

#[tokio::test]
async fn test_solve_and_learn_pass_skips_update() {
    let dir = TempDir::new().unwrap();
    let app = app(vec![
        json!({"files": [{"path": "src/lib.rs", "content": "pub fn add() {}"}]}),
        json!({
            "verdict": "pass",
            "rationale": "tests pass and match the reference",
            "evidence": ["cargo test: ok"],
            "failure_modes": []
        }),
    ]);

    let (status, body) = send(
        &app.router,
        post(
            "/solve_and_learn",
            json!({
                "problem": "add two numbers",
                "repo_path": dir.path().display().to_string(),
                "reference_solution": "a + b"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["judge"]["verdict"], "pass");
    assert_eq!(body["tests"]["passed"], true);
    assert!(body["policy_committed"].is_null());
    assert!(body["policy_update_score"].is_null());
    assert!(body.get("decision").is_none());
    assert!(app.store.is_empty().await.unwrap());
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = app(vec![go_mode_response()]);

    let (status, health) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["policy_versions"], 0);

    send(
        &app.router,
        post("/route_and_respond", json!({"user_query": "what is a monad"})),
    )
    .await;

    let response = app.router.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("continual_policy_routes_total"));
}

#[tokio::test]
async fn test_request_id_assigned_when_absent() {
    let app = app(vec![]);
    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}
