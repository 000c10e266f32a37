//! Context Kernel REST Service
//!
//! Exposes the kernel operations over HTTP. Handlers are thin: every
//! request maps onto one [`ContextKernel`](crate::ContextKernel) call and
//! errors map onto status codes by class (404 / 400 / 502).
//!
//! ## Endpoints
//!
//! - `PUT /api/graphs/:graph_id` - Replace a graph's nodes and edges
//! - `POST /api/graphs/:graph_id/plan` - Build an execution plan
//! - `POST /api/graphs/:graph_id/nodes/:node_id/history` - Message history
//! - `POST /api/graphs/:graph_id/nodes/:node_id/aggregator-prompt` - Aggregator prompt
//! - `GET /api/graphs/:graph_id/nodes/:node_id/routing-prompt` - Routing prompt
//! - `POST /api/graphs/:graph_id/mergers/:node_id/history` - Merged branch context
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, record_operation};
pub use routes::{create_router, ApiError, ErrorResponse};
pub use state::ServiceState;
