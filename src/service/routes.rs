//! Axum routes for the Context Kernel service.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Instant;

use crate::error::{KernelError, KernelResult};
use crate::history::{HistoryOptions, RoutingPrompt};
use crate::store::GraphStore;
use crate::types::{Edge, ExecutionPlan, GraphId, Message, NodeId, NodeRecord, NodeSelector};
use crate::CONTEXT_KERNEL_SCHEMA_VERSION;

use super::middleware::record_operation;
use super::state::ServiceState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to build an execution plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRequest {
    /// `downstream`, `upstream`, `multiple` or `all`.
    pub direction: String,
    /// A node id, or a list of ids for `multiple`. Ignored by `all`.
    #[serde(default)]
    pub node: Option<NodeSelector>,
}

/// Request to merge branch contexts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeRequest {
    /// Prepended as a system message when non-empty.
    pub system_prompt: String,
}

/// Request to replace a graph wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceGraphRequest {
    /// Every node of the graph.
    pub nodes: Vec<NodeRecord>,
    /// Every edge of the graph.
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Response carrying a message list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagesResponse {
    /// The constructed messages.
    pub messages: Vec<Message>,
}

/// Response carrying a routing prompt and its structured-output schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingPromptResponse {
    /// Prompt, route group and allowed route ids.
    #[serde(flatten)]
    pub prompt: RoutingPrompt,
    /// JSON Schema for the model's structured output.
    pub response_schema: serde_json::Value,
}

/// Response to a graph replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplaceGraphResponse {
    /// Graph that was replaced.
    pub graph_id: GraphId,
    /// Nodes written.
    pub node_count: usize,
    /// Edges written.
    pub edge_count: usize,
}

/// Service health response (detailed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub schema_version: String,
    pub store_connected: bool,
    pub uptime_secs: u64,
}

/// Simple liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub status: String,
}

/// Readiness response with dependency status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub store: bool,
    pub details: Option<String>,
}

/// Structured error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Machine-readable error code.
    pub code: String,
    /// Additional error details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    /// Create a new error response with code and message.
    pub fn new(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    /// Add details to the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// A kernel error on its way to the client.
#[derive(Debug)]
pub struct ApiError(pub KernelError);

impl From<KernelError> for ApiError {
    fn from(e: KernelError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            KernelError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            KernelError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            KernelError::Store(_) => (StatusCode::BAD_GATEWAY, "STORE_FAILED"),
            KernelError::Model(_) => (StatusCode::BAD_GATEWAY, "MODEL_FAILED"),
            KernelError::Mirror(_) => (StatusCode::BAD_GATEWAY, "MIRROR_FAILED"),
            KernelError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = self.status_and_code();
        let mut body = ErrorResponse::new(code, self.0.to_string());
        if let Some(source) = std::error::Error::source(&self.0) {
            body = body.with_details(source.to_string());
        }

        if self.0.is_client_error() {
            tracing::warn!(code = %body.code, error = %body.error, "Request error");
        } else {
            tracing::error!(code = %body.code, error = %body.error, details = ?body.details, "Upstream failure");
        }
        (status, Json(body)).into_response()
    }
}

/// Run one kernel operation and record its outcome.
async fn timed<T>(operation: &str, fut: impl Future<Output = KernelResult<T>>) -> Result<T, ApiError> {
    let start = Instant::now();
    let result = fut.await;
    record_operation(operation, start.elapsed().as_millis() as u64, result.is_ok());
    result.map_err(ApiError::from)
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn plan_handler<S: GraphStore + 'static>(
    State(state): State<ServiceState<S>>,
    Path(graph_id): Path<String>,
    Json(request): Json<PlanRequest>,
) -> Result<Json<ExecutionPlan>, ApiError> {
    let graph_id = GraphId::new(graph_id);
    let plan = timed(
        "execution_plan",
        state
            .kernel
            .get_execution_plan_by_node(&graph_id, &request.direction, request.node.as_ref()),
    )
    .await?;
    Ok(Json(plan))
}

async fn history_handler<S: GraphStore + 'static>(
    State(state): State<ServiceState<S>>,
    Path((graph_id, node_id)): Path<(String, String)>,
    Json(options): Json<HistoryOptions>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let (graph_id, node_id) = (GraphId::new(graph_id), NodeId::new(node_id));
    let messages = timed(
        "message_history",
        state.kernel.construct_message_history(&graph_id, &node_id, &options),
    )
    .await?;
    Ok(Json(MessagesResponse { messages }))
}

async fn aggregator_prompt_handler<S: GraphStore + 'static>(
    State(state): State<ServiceState<S>>,
    Path((graph_id, node_id)): Path<(String, String)>,
    Json(options): Json<HistoryOptions>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let (graph_id, node_id) = (GraphId::new(graph_id), NodeId::new(node_id));
    let messages = timed(
        "aggregator_prompt",
        state
            .kernel
            .construct_parallelization_aggregator_prompt(&graph_id, &node_id, &options),
    )
    .await?;
    Ok(Json(MessagesResponse { messages }))
}

async fn routing_prompt_handler<S: GraphStore + 'static>(
    State(state): State<ServiceState<S>>,
    Path((graph_id, node_id)): Path<(String, String)>,
) -> Result<Json<RoutingPromptResponse>, ApiError> {
    let (graph_id, node_id) = (GraphId::new(graph_id), NodeId::new(node_id));
    let prompt = timed(
        "routing_prompt",
        state.kernel.construct_routing_prompt(&graph_id, &node_id),
    )
    .await?;
    Ok(Json(RoutingPromptResponse {
        response_schema: prompt.schema.json_schema(),
        prompt,
    }))
}

async fn merged_history_handler<S: GraphStore + 'static>(
    State(state): State<ServiceState<S>>,
    Path((graph_id, merger_id)): Path<(String, String)>,
    Json(request): Json<MergeRequest>,
) -> Result<Json<MessagesResponse>, ApiError> {
    let (graph_id, merger_id) = (GraphId::new(graph_id), NodeId::new(merger_id));
    let messages = timed(
        "merged_history",
        state
            .kernel
            .construct_merged_history(&graph_id, &merger_id, &request.system_prompt),
    )
    .await?;
    Ok(Json(MessagesResponse { messages }))
}

async fn replace_graph_handler<S: GraphStore + 'static>(
    State(state): State<ServiceState<S>>,
    Path(graph_id): Path<String>,
    Json(request): Json<ReplaceGraphRequest>,
) -> Result<Json<ReplaceGraphResponse>, ApiError> {
    let graph_id = GraphId::new(graph_id);
    let (node_count, edge_count) = (request.nodes.len(), request.edges.len());
    timed(
        "replace_graph",
        state.kernel.replace_graph(&graph_id, request.nodes, request.edges),
    )
    .await?;
    Ok(Json(ReplaceGraphResponse {
        graph_id,
        node_count,
        edge_count,
    }))
}

/// Health check endpoint (detailed).
async fn health_handler<S: GraphStore + 'static>(
    State(state): State<ServiceState<S>>,
) -> Json<HealthResponse> {
    let store_connected = state.kernel.is_healthy().await;

    Json(HealthResponse {
        status: if store_connected { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        schema_version: CONTEXT_KERNEL_SCHEMA_VERSION.to_string(),
        store_connected,
        uptime_secs: state.uptime_secs(),
    })
}

/// Liveness probe endpoint. Does NOT check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the store is reachable, 503 otherwise.
async fn readiness_handler<S: GraphStore + 'static>(
    State(state): State<ServiceState<S>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.kernel.is_healthy().await {
        Ok(Json(ReadinessResponse {
            ready: true,
            store: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                store: false,
                details: Some("Graph store unreachable".to_string()),
            }),
        ))
    }
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the Context Kernel service.
pub fn create_router<S: GraphStore + 'static>(state: ServiceState<S>) -> Router {
    Router::new()
        // Graph writes
        .route("/api/graphs/:graph_id", put(replace_graph_handler::<S>))
        // Planning
        .route("/api/graphs/:graph_id/plan", post(plan_handler::<S>))
        // Context construction
        .route("/api/graphs/:graph_id/nodes/:node_id/history", post(history_handler::<S>))
        .route(
            "/api/graphs/:graph_id/nodes/:node_id/aggregator-prompt",
            post(aggregator_prompt_handler::<S>),
        )
        .route(
            "/api/graphs/:graph_id/nodes/:node_id/routing-prompt",
            get(routing_prompt_handler::<S>),
        )
        .route(
            "/api/graphs/:graph_id/mergers/:node_id/history",
            post(merged_history_handler::<S>),
        )
        // Health checks
        .route("/health", get(health_handler::<S>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<S>))
        .with_state(state)
}
