//! Graph storage backends.
//!
//! Two seams, one backend: [`NodeRepository`] serves node payloads and
//! [`GraphStore`] serves topology. Every key is scoped by [`GraphId`] so
//! several graphs can share one store without their node ids colliding.

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use std::fmt;

use crate::types::{Edge, GraphId, NodeId, NodeRecord, NodeRef};

/// Store key of a node: `"{graph_id}:{node_id}"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeKey {
    /// Owning graph.
    pub graph_id: GraphId,
    /// Graph-local node id.
    pub node_id: NodeId,
}

impl NodeKey {
    /// Create a new key.
    pub fn new(graph_id: &GraphId, node_id: &NodeId) -> Self {
        Self {
            graph_id: graph_id.clone(),
            node_id: node_id.clone(),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.graph_id, self.node_id)
    }
}

/// Node payload access.
#[async_trait]
pub trait NodeRepository: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch node records. Missing ids are skipped; results are ordered by node id.
    async fn get_nodes_by_ids(
        &self,
        graph_id: &GraphId,
        ids: &[NodeId],
    ) -> Result<Vec<NodeRecord>, Self::Error>;

    /// Shallow-merge `patch` into a node's `data`. Fails if the node is absent.
    async fn update_node_data(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), Self::Error>;
}

/// Topology access.
///
/// Implementations must guarantee deterministic ordering of results and
/// must collapse parallel edges into one connectivity fact.
#[async_trait]
pub trait GraphStore: NodeRepository {
    /// Fetch a node's id and type.
    async fn get_node_ref(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> Result<Option<NodeRef>, Self::Error>;

    /// Direct predecessors (sources of incoming edges), ordered by node id.
    async fn get_predecessors(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> Result<Vec<NodeRef>, Self::Error>;

    /// Direct successors (targets of outgoing edges), ordered by node id.
    async fn get_successors(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> Result<Vec<NodeRef>, Self::Error>;

    /// Every node of a graph, ordered by node id.
    async fn list_nodes(&self, graph_id: &GraphId) -> Result<Vec<NodeRef>, Self::Error>;

    /// Replace a graph's entire node and edge set atomically.
    async fn replace_graph(
        &self,
        graph_id: &GraphId,
        nodes: Vec<NodeRecord>,
        edges: Vec<Edge>,
    ) -> Result<(), Self::Error>;

    /// Whether the backend is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

pub use memory::{InMemoryError, InMemoryGraphStore};

#[cfg(feature = "postgres")]
pub use postgres::{PostgresGraphStore, PostgresConfig, PostgresError, PoolStats};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_key_display() {
        let key = NodeKey::new(&"g1".into(), &"n7".into());
        assert_eq!(key.to_string(), "g1:n7");
    }

    #[test]
    fn test_node_keys_group_by_graph() {
        let a = NodeKey::new(&"g1".into(), &"z".into());
        let b = NodeKey::new(&"g2".into(), &"a".into());
        assert!(a < b);
    }
}
