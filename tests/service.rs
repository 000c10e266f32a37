//! HTTP surface tests, driven through the router with `tower::ServiceExt`.

#![cfg(feature = "service")]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use context_kernel::service::{create_router, ServiceState};
use context_kernel::store::InMemoryGraphStore;
use context_kernel::{
    ContextKernel, GenerationParams, KernelConfig, Message, ModelClient, ModelError, StaticSettings,
};
use serde_json::{json, Value};
use tower::ServiceExt;

struct EchoModel;

#[async_trait]
impl ModelClient for EchoModel {
    async fn generate_non_streaming(
        &self,
        _messages: &[Message],
        model: &str,
        _params: &GenerationParams,
    ) -> Result<String, ModelError> {
        Ok(format!("summary by {}", model))
    }
}

fn app() -> Router {
    let kernel = ContextKernel::new(
        Arc::new(InMemoryGraphStore::new()),
        Arc::new(StaticSettings::new()),
        Arc::new(EchoModel),
        KernelConfig::default(),
    );
    create_router(ServiceState::new(kernel))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn seed(app: &Router) {
    let (status, body) = send(
        app,
        "PUT",
        "/api/graphs/g1",
        Some(json!({
            "nodes": [
                {"id": "p1", "type": "PROMPT", "data": {"prompt": "hello"}},
                {"id": "t1", "type": "TEXT_TO_TEXT", "data": {"model": "m", "reply": "hi there"}},
                {"id": "p2", "type": "PROMPT", "data": {"prompt": "and then?"}},
                {"id": "t2", "type": "TEXT_TO_TEXT", "data": {"model": "m", "reply": ""}},
                {"id": "m1", "type": "CONTEXT_MERGER", "data": {"mode": "summary"}}
            ],
            "edges": [
                {"id": "e1", "source": "p1", "target": "t1"},
                {"id": "e2", "source": "t1", "target": "p2"},
                {"id": "e3", "source": "p2", "target": "t2"},
                {"id": "e4", "source": "t1", "target": "m1"}
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["node_count"], 5);
}

#[tokio::test]
async fn test_history_endpoint() {
    let app = app();
    seed(&app).await;

    let (status, body) = send(&app, "POST", "/api/graphs/g1/nodes/t2/history", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[1]["role"], "assistant");
    assert_eq!(messages[1]["content"][0]["text"], "hi there");
}

#[tokio::test]
async fn test_plan_endpoint() {
    let app = app();
    seed(&app).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/graphs/g1/plan",
        Some(json!({"direction": "downstream", "node": "p1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let steps = body["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0]["node_id"], "t1");
    assert_eq!(steps[1]["depends_on"], json!(["t1"]));
    assert!(body["plan_hash"].is_string());
}

#[tokio::test]
async fn test_merger_endpoint_summarizes() {
    let app = app();
    seed(&app).await;

    let (status, body) = send(&app, "POST", "/api/graphs/g1/mergers/m1/history", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let text = body["messages"][0]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("<branch id=\"t1\">summary by gpt-4o-mini</branch>"));
}

#[tokio::test]
async fn test_error_statuses() {
    let app = app();
    seed(&app).await;

    let (status, body) = send(&app, "POST", "/api/graphs/g1/nodes/ghost/history", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = send(
        &app,
        "POST",
        "/api/graphs/g1/plan",
        Some(json!({"direction": "sideways", "node": "p1"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, _) = send(&app, "GET", "/api/graphs/g1/nodes/t1/routing-prompt", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_health_probes() {
    let app = app();

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["schema_version"], context_kernel::CONTEXT_KERNEL_SCHEMA_VERSION);

    let (status, body) = send(&app, "GET", "/health/live", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "alive");

    let (status, body) = send(&app, "GET", "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}
