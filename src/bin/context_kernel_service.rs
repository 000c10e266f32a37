//! Context Kernel Service Binary
//!
//! Serves plans, message histories and merged contexts over HTTP, backed by
//! PostgreSQL.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `ROUTE_GROUPS_PATH`: JSON file with route groups and generation flags (optional)
//! - `OPENAI_BASE_URL`, `OPENAI_API_KEY`: model endpoint used for branch summaries
//! - `SUMMARY_MODEL`, `MERGE_CONCURRENCY`, `HISTORY_CONCURRENCY`, `AGGREGATOR_PROMPT`: kernel tuning
//! - `MIRROR_ROOT`: local repository checkouts for GITHUB nodes (optional)
//! - `PORT` (default 8001), `HOST` (default 0.0.0.0)
//! - `RUST_LOG`: log filter; `LOG_FORMAT=pretty` for human-readable logs (default json)
//!
//! ```bash
//! DATABASE_URL=postgresql://... cargo run --bin context_kernel_service --features service
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{extract::Request, middleware, middleware::Next, response::Response};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use context_kernel::collab::{OpenAiCompatClient, OpenAiConfig};
use context_kernel::service::{create_router, metrics_middleware, ServiceState};
use context_kernel::{ContextKernel, FsRepositoryMirror, KernelConfig, PostgresGraphStore, StaticSettings};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "context_kernel=info,context_kernel_service=info,tower_http=info,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("pretty") {
        registry.with(tracing_subscriber::fmt::layer()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
            .init();
    }
}

/// Runs each request inside a span carrying its `X-Request-Id` (or a fresh one).
async fn correlate(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("X-Request-Id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let span = info_span!("request", request_id = %request_id, path = %request.uri().path());

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", value);
    }
    response
}

async fn build_kernel() -> Result<ContextKernel<PostgresGraphStore>, Box<dyn std::error::Error>> {
    let started = Instant::now();
    let store = tokio::time::timeout(CONNECT_TIMEOUT, PostgresGraphStore::from_env())
        .await
        .map_err(|_| "PostgreSQL connection timed out")??;
    store.migrate().await?;
    info!(latency_ms = started.elapsed().as_millis() as u64, "Graph store ready");

    let settings = StaticSettings::from_env()?;
    let model = OpenAiCompatClient::new(OpenAiConfig::from_env())?;
    let config = KernelConfig::from_env();
    info!(
        route_groups = settings.route_group_count(),
        summary_model = %config.summary_model,
        merge_concurrency = config.merge_concurrency,
        history_concurrency = config.history_concurrency,
        "Kernel configured"
    );

    let kernel = ContextKernel::new(Arc::new(store), Arc::new(settings), Arc::new(model), config);
    Ok(match std::env::var("MIRROR_ROOT") {
        Ok(root) if !root.is_empty() => {
            info!(root = %root, "Repository mirror enabled");
            kernel.with_mirror(Arc::new(FsRepositoryMirror::new(root)))
        }
        _ => {
            warn!("MIRROR_ROOT not set; GITHUB nodes use their saved file content");
            kernel
        }
    })
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    let _ = tokio::signal::ctrl_c().await;

    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    info!(version = env!("CARGO_PKG_VERSION"), "Starting Context Kernel Service");

    let kernel = build_kernel().await.map_err(|e| {
        tracing::error!(error = %e, "Startup failed");
        e
    })?;

    let app = create_router(ServiceState::new(kernel))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(correlate))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let port: u16 = std::env::var("PORT").ok().and_then(|s| s.parse().ok()).unwrap_or(8001);
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, "Context Kernel Service listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Context Kernel Service stopped");
    Ok(())
}
