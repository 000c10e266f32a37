//! Service middleware for request metrics.
//!
//! ## Metrics Exposed
//!
//! - `request` events: path pattern, method, status, latency
//! - `operation` events: kernel operation name, outcome, latency
//!
//! Both are structured log events under the `context_kernel::metrics` target.

use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

/// Metrics middleware that records request counts and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "context_kernel::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Graph, node and merger ids are replaced with `:id`.
fn normalize_path(path: &str) -> String {
    static ID_SEGMENT: OnceLock<regex_lite::Regex> = OnceLock::new();
    let re = ID_SEGMENT.get_or_init(|| {
        regex_lite::Regex::new(r"/(graphs|nodes|mergers)/[^/]+").expect("valid id-segment regex")
    });

    re.replace_all(path, "/$1/:id").to_string()
}

/// Record the outcome of one kernel operation.
pub fn record_operation(operation: &str, latency_ms: u64, success: bool) {
    let status = if success { "success" } else { "error" };
    info!(
        target: "context_kernel::metrics",
        metric_type = "operation",
        operation = operation,
        status = status,
        latency_ms = latency_ms,
        "operation_metric"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_replaces_ids() {
        assert_eq!(
            normalize_path("/api/graphs/g-42/nodes/n_7/history"),
            "/api/graphs/:id/nodes/:id/history"
        );
        assert_eq!(normalize_path("/api/graphs/g1/mergers/m1/history"), "/api/graphs/:id/mergers/:id/history");
        assert_eq!(normalize_path("/api/graphs/g1/plan"), "/api/graphs/:id/plan");
    }

    #[test]
    fn test_normalize_path_preserves_regular_path() {
        assert_eq!(normalize_path("/health/ready"), "/health/ready");
    }
}
