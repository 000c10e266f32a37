//! Edge types for conversation graphs.

use serde::{Deserialize, Serialize};
use super::node::NodeId;

/// Directed "connects-to" edge between two nodes of the same graph.
///
/// Edges carry no semantic payload; UI metadata is not modelled here.
/// Implements `Ord` for deterministic ordering: (source, target, id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Edge identifier, unique within its graph.
    pub id: String,
    /// Source node.
    #[serde(alias = "source")]
    pub source_node_id: NodeId,
    /// Target node.
    #[serde(alias = "target")]
    pub target_node_id: NodeId,
}

impl Edge {
    /// Create a new edge.
    pub fn new(id: impl Into<String>, source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            source_node_id: source.into(),
            target_node_id: target.into(),
        }
    }

    /// Create an edge whose id is derived from its endpoints.
    pub fn connect(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("e-{}-{}", source, target),
            source_node_id: source,
            target_node_id: target,
        }
    }
}

impl PartialOrd for Edge {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Edge {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.source_node_id
            .cmp(&other.source_node_id)
            .then_with(|| self.target_node_id.cmp(&other.target_node_id))
            .then_with(|| self.id.cmp(&other.id))
    }
}
