//! PostgreSQL graph store for production use.
//!
//! ## Configuration
//!
//! All settings can be configured via environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `DB_MAX_CONNECTIONS`: Maximum pool size (default: 10)
//! - `DB_MIN_CONNECTIONS`: Minimum idle connections (default: 2)
//! - `DB_CONNECT_TIMEOUT_SECS`: Connection timeout (default: 10)
//! - `DB_IDLE_TIMEOUT_SECS`: Idle connection timeout (default: 300)
//! - `DB_MAX_LIFETIME_SECS`: Max connection lifetime (default: 1800)
//!
//! ## Schema
//!
//! See [`SCHEMA`]. Nodes are keyed by `(graph_id, node_id)`; edges carry no
//! payload beyond their endpoints.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Executor, Row};
use std::time::Duration;

use super::{GraphStore, NodeKey, NodeRepository};
use crate::types::{Edge, GraphId, NodeId, NodeRecord, NodeRef, NodeType};

/// DDL for the tables this store reads and writes.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS graph_nodes (
    graph_id   TEXT  NOT NULL,
    node_id    TEXT  NOT NULL,
    node_type  TEXT  NOT NULL,
    data       JSONB NOT NULL DEFAULT '{}'::jsonb,
    PRIMARY KEY (graph_id, node_id)
);

CREATE TABLE IF NOT EXISTS graph_edges (
    graph_id        TEXT NOT NULL,
    edge_id         TEXT NOT NULL,
    source_node_id  TEXT NOT NULL,
    target_node_id  TEXT NOT NULL,
    PRIMARY KEY (graph_id, edge_id),
    FOREIGN KEY (graph_id, source_node_id) REFERENCES graph_nodes (graph_id, node_id) ON DELETE CASCADE,
    FOREIGN KEY (graph_id, target_node_id) REFERENCES graph_nodes (graph_id, node_id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_graph_edges_target ON graph_edges (graph_id, target_node_id);
CREATE INDEX IF NOT EXISTS idx_graph_edges_source ON graph_edges (graph_id, source_node_id);
"#;

/// Configuration for PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Database connection URL.
    pub database_url: String,
    /// Maximum connections in pool (default: 10).
    pub max_connections: u32,
    /// Minimum idle connections to keep warm (default: 2).
    pub min_connections: u32,
    /// Connection acquire timeout in seconds (default: 10).
    pub connect_timeout_secs: u64,
    /// Idle connection timeout in seconds (default: 300 = 5 min).
    pub idle_timeout_secs: u64,
    /// Maximum connection lifetime in seconds (default: 1800 = 30 min).
    pub max_lifetime_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl PostgresConfig {
    /// Load configuration from environment variables with production defaults.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/context_kernel".to_string()),
            max_connections: env_or("DB_MAX_CONNECTIONS", 10),
            min_connections: env_or("DB_MIN_CONNECTIONS", 2),
            connect_timeout_secs: env_or("DB_CONNECT_TIMEOUT_SECS", 10),
            idle_timeout_secs: env_or("DB_IDLE_TIMEOUT_SECS", 300),
            max_lifetime_secs: env_or("DB_MAX_LIFETIME_SECS", 1800),
        }
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    /// Current pool size.
    pub size: u32,
    /// Number of idle connections.
    pub idle: usize,
    /// Maximum pool size.
    pub max: u32,
}

/// Error type for PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Write target does not exist.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeKey),
}

/// PostgreSQL graph store.
pub struct PostgresGraphStore {
    pool: PgPool,
}

impl PostgresGraphStore {
    /// Create a new store with the given configuration.
    pub async fn new(config: PostgresConfig) -> Result<Self, sqlx::Error> {
        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            connect_timeout_secs = config.connect_timeout_secs,
            idle_timeout_secs = config.idle_timeout_secs,
            max_lifetime_secs = config.max_lifetime_secs,
            "Initializing PostgreSQL connection pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Create a store from environment variables.
    pub async fn from_env() -> Result<Self, sqlx::Error> {
        Self::new(PostgresConfig::from_env()).await
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the tables if they do not exist.
    pub async fn migrate(&self) -> Result<(), sqlx::Error> {
        // Unprepared, so the multi-statement DDL runs in one round trip.
        self.pool.execute(SCHEMA).await?;
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get pool statistics for monitoring.
    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max: self.pool.options().get_max_connections(),
        }
    }

    fn parse_ref(row: &PgRow) -> Result<NodeRef, sqlx::Error> {
        let id: String = row.try_get("node_id")?;
        let node_type: String = row.try_get("node_type")?;
        Ok(NodeRef::new(id, NodeType::parse(&node_type)))
    }

    fn parse_record(row: &PgRow) -> Result<NodeRecord, sqlx::Error> {
        let node = Self::parse_ref(row)?;
        let data: Option<serde_json::Value> = row.try_get("data")?;
        Ok(NodeRecord::new(
            node.id,
            node.node_type,
            data.unwrap_or(serde_json::Value::Null),
        ))
    }
}

#[async_trait]
impl NodeRepository for PostgresGraphStore {
    type Error = PostgresError;

    async fn get_nodes_by_ids(
        &self,
        graph_id: &GraphId,
        ids: &[NodeId],
    ) -> Result<Vec<NodeRecord>, Self::Error> {
        let ids: Vec<&str> = ids.iter().map(NodeId::as_str).collect();
        let rows = sqlx::query(
            r#"
            SELECT node_id, node_type, data
            FROM graph_nodes
            WHERE graph_id = $1 AND node_id = ANY($2)
            ORDER BY node_id
            "#,
        )
        .bind(graph_id.as_str())
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_record)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }

    async fn update_node_data(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), Self::Error> {
        let result = sqlx::query(
            r#"
            UPDATE graph_nodes
            SET data = CASE WHEN jsonb_typeof(data) = 'object' THEN data ELSE '{}'::jsonb END || $3
            WHERE graph_id = $1 AND node_id = $2
            "#,
        )
        .bind(graph_id.as_str())
        .bind(node_id.as_str())
        .bind(sqlx::types::Json(serde_json::Value::Object(patch)))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PostgresError::NodeNotFound(NodeKey::new(graph_id, node_id)));
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for PostgresGraphStore {
    async fn get_node_ref(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> Result<Option<NodeRef>, Self::Error> {
        let row = sqlx::query(
            r#"
            SELECT node_id, node_type
            FROM graph_nodes
            WHERE graph_id = $1 AND node_id = $2
            "#,
        )
        .bind(graph_id.as_str())
        .bind(node_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(Self::parse_ref(r)?)),
            None => Ok(None),
        }
    }

    async fn get_predecessors(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> Result<Vec<NodeRef>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT n.node_id, n.node_type
            FROM graph_edges e
            JOIN graph_nodes n ON n.graph_id = e.graph_id AND n.node_id = e.source_node_id
            WHERE e.graph_id = $1 AND e.target_node_id = $2
            ORDER BY n.node_id
            "#,
        )
        .bind(graph_id.as_str())
        .bind(node_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_ref)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }

    async fn get_successors(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> Result<Vec<NodeRef>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT n.node_id, n.node_type
            FROM graph_edges e
            JOIN graph_nodes n ON n.graph_id = e.graph_id AND n.node_id = e.target_node_id
            WHERE e.graph_id = $1 AND e.source_node_id = $2
            ORDER BY n.node_id
            "#,
        )
        .bind(graph_id.as_str())
        .bind(node_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_ref)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }

    async fn list_nodes(&self, graph_id: &GraphId) -> Result<Vec<NodeRef>, Self::Error> {
        let rows = sqlx::query(
            r#"
            SELECT node_id, node_type
            FROM graph_nodes
            WHERE graph_id = $1
            ORDER BY node_id
            "#,
        )
        .bind(graph_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(Self::parse_ref)
            .collect::<Result<Vec<_>, _>>()
            .map_err(PostgresError::from)
    }

    async fn replace_graph(
        &self,
        graph_id: &GraphId,
        nodes: Vec<NodeRecord>,
        edges: Vec<Edge>,
    ) -> Result<(), Self::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM graph_edges WHERE graph_id = $1")
            .bind(graph_id.as_str())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM graph_nodes WHERE graph_id = $1")
            .bind(graph_id.as_str())
            .execute(&mut *tx)
            .await?;

        for node in &nodes {
            sqlx::query(
                "INSERT INTO graph_nodes (graph_id, node_id, node_type, data) VALUES ($1, $2, $3, $4)",
            )
            .bind(graph_id.as_str())
            .bind(node.id.as_str())
            .bind(node.node_type.as_str())
            .bind(sqlx::types::Json(&node.data))
            .execute(&mut *tx)
            .await?;
        }

        for edge in &edges {
            sqlx::query(
                "INSERT INTO graph_edges (graph_id, edge_id, source_node_id, target_node_id) VALUES ($1, $2, $3, $4)",
            )
            .bind(graph_id.as_str())
            .bind(edge.id.as_str())
            .bind(edge.source_node_id.as_str())
            .bind(edge.target_node_id.as_str())
            .execute(&mut *tx)
            .await?;
        }

        // Dropping `tx` on an early return above rolls everything back.
        tx.commit().await?;

        tracing::info!(
            graph_id = %graph_id,
            nodes = nodes.len(),
            edges = edges.len(),
            "Graph replaced"
        );
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .is_ok()
    }
}
