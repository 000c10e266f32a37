//! In-memory graph store for tests and embedding.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

use super::{GraphStore, NodeKey, NodeRepository};
use crate::types::{Edge, GraphId, NodeId, NodeRecord, NodeRef};

/// Error type for in-memory store.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InMemoryError {
    /// Node not found.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeKey),
    /// Edge endpoint missing from the node set being written.
    #[error("Edge {edge_id} references unknown node {node}")]
    DanglingEdge {
        /// Offending edge.
        edge_id: String,
        /// Missing endpoint.
        node: NodeKey,
    },
}

#[derive(Debug, Default)]
struct GraphIndex {
    nodes: BTreeMap<NodeKey, NodeRecord>,
    /// Target -> sources.
    predecessors: BTreeMap<NodeKey, BTreeSet<NodeId>>,
    /// Source -> targets.
    successors: BTreeMap<NodeKey, BTreeSet<NodeId>>,
    edges: BTreeMap<GraphId, BTreeSet<Edge>>,
}

impl GraphIndex {
    fn insert_edge(&mut self, graph_id: &GraphId, edge: Edge) {
        self.predecessors
            .entry(NodeKey::new(graph_id, &edge.target_node_id))
            .or_default()
            .insert(edge.source_node_id.clone());
        self.successors
            .entry(NodeKey::new(graph_id, &edge.source_node_id))
            .or_default()
            .insert(edge.target_node_id.clone());
        self.edges.entry(graph_id.clone()).or_default().insert(edge);
    }

    fn remove_graph(&mut self, graph_id: &GraphId) {
        self.nodes.retain(|k, _| &k.graph_id != graph_id);
        self.predecessors.retain(|k, _| &k.graph_id != graph_id);
        self.successors.retain(|k, _| &k.graph_id != graph_id);
        self.edges.remove(graph_id);
    }

    fn resolve(&self, graph_id: &GraphId, ids: Option<&BTreeSet<NodeId>>) -> Vec<NodeRef> {
        ids.into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(&NodeKey::new(graph_id, id)))
            .map(NodeRecord::node_ref)
            .collect()
    }
}

/// In-memory graph store.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order. Writes go
/// through a `RwLock`, so the store can be shared behind an `Arc`.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    index: RwLock<GraphIndex>,
}

impl InMemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or overwrite) a node.
    pub fn add_node(&self, graph_id: &GraphId, record: NodeRecord) {
        let key = NodeKey::new(graph_id, &record.id);
        self.index.write().nodes.insert(key, record);
    }

    /// Add an edge. Endpoints are not checked.
    pub fn add_edge(&self, graph_id: &GraphId, edge: Edge) {
        self.index.write().insert_edge(graph_id, edge);
    }

    /// Current `data` of a node.
    pub fn node_data(&self, graph_id: &GraphId, node_id: &NodeId) -> Option<serde_json::Value> {
        self.index
            .read()
            .nodes
            .get(&NodeKey::new(graph_id, node_id))
            .map(|r| r.data.clone())
    }

    /// Number of nodes across all graphs.
    pub fn num_nodes(&self) -> usize {
        self.index.read().nodes.len()
    }

    /// Number of edges across all graphs.
    pub fn num_edges(&self) -> usize {
        self.index.read().edges.values().map(BTreeSet::len).sum()
    }
}

#[async_trait]
impl NodeRepository for InMemoryGraphStore {
    type Error = InMemoryError;

    async fn get_nodes_by_ids(
        &self,
        graph_id: &GraphId,
        ids: &[NodeId],
    ) -> Result<Vec<NodeRecord>, Self::Error> {
        let wanted: BTreeSet<&NodeId> = ids.iter().collect();
        let index = self.index.read();
        Ok(wanted
            .into_iter()
            .filter_map(|id| index.nodes.get(&NodeKey::new(graph_id, id)).cloned())
            .collect())
    }

    async fn update_node_data(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        patch: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), Self::Error> {
        let key = NodeKey::new(graph_id, node_id);
        let mut index = self.index.write();
        let record = index
            .nodes
            .get_mut(&key)
            .ok_or_else(|| InMemoryError::NodeNotFound(key.clone()))?;

        if !record.data.is_object() {
            record.data = serde_json::Value::Object(serde_json::Map::new());
        }
        if let serde_json::Value::Object(data) = &mut record.data {
            data.extend(patch);
        }
        Ok(())
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn get_node_ref(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> Result<Option<NodeRef>, Self::Error> {
        Ok(self
            .index
            .read()
            .nodes
            .get(&NodeKey::new(graph_id, node_id))
            .map(NodeRecord::node_ref))
    }

    async fn get_predecessors(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> Result<Vec<NodeRef>, Self::Error> {
        let index = self.index.read();
        Ok(index.resolve(graph_id, index.predecessors.get(&NodeKey::new(graph_id, node_id))))
    }

    async fn get_successors(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> Result<Vec<NodeRef>, Self::Error> {
        let index = self.index.read();
        Ok(index.resolve(graph_id, index.successors.get(&NodeKey::new(graph_id, node_id))))
    }

    async fn list_nodes(&self, graph_id: &GraphId) -> Result<Vec<NodeRef>, Self::Error> {
        Ok(self
            .index
            .read()
            .nodes
            .iter()
            .filter(|(k, _)| &k.graph_id == graph_id)
            .map(|(_, r)| r.node_ref())
            .collect())
    }

    async fn replace_graph(
        &self,
        graph_id: &GraphId,
        nodes: Vec<NodeRecord>,
        edges: Vec<Edge>,
    ) -> Result<(), Self::Error> {
        let ids: BTreeSet<&NodeId> = nodes.iter().map(|n| &n.id).collect();
        for edge in &edges {
            for endpoint in [&edge.source_node_id, &edge.target_node_id] {
                if !ids.contains(endpoint) {
                    return Err(InMemoryError::DanglingEdge {
                        edge_id: edge.id.clone(),
                        node: NodeKey::new(graph_id, endpoint),
                    });
                }
            }
        }

        let (node_count, edge_count) = (nodes.len(), edges.len());
        let mut index = self.index.write();
        index.remove_graph(graph_id);
        for record in nodes {
            index.nodes.insert(NodeKey::new(graph_id, &record.id), record);
        }
        for edge in edges {
            index.insert_edge(graph_id, edge);
        }

        tracing::debug!(
            graph_id = %graph_id,
            nodes = node_count,
            edges = edge_count,
            "Graph replaced in memory store"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;
    use serde_json::json;

    fn graph() -> GraphId {
        GraphId::from("g1")
    }

    fn prompt(id: &str) -> NodeRecord {
        NodeRecord::new(id, NodeType::Prompt, json!({"prompt": id}))
    }

    #[tokio::test]
    async fn test_add_and_get_node() {
        let store = InMemoryGraphStore::new();
        store.add_node(&graph(), prompt("a"));

        let node = store.get_node_ref(&graph(), &"a".into()).await.unwrap();
        assert_eq!(node, Some(NodeRef::new("a", NodeType::Prompt)));
        assert!(store.get_node_ref(&"other".into(), &"a".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_parallel_edges_collapse() {
        let store = InMemoryGraphStore::new();
        store.add_node(&graph(), prompt("a"));
        store.add_node(&graph(), NodeRecord::new("b", NodeType::TextToText, json!({})));
        store.add_edge(&graph(), Edge::new("e1", "a", "b"));
        store.add_edge(&graph(), Edge::new("e2", "a", "b"));

        let preds = store.get_predecessors(&graph(), &"b".into()).await.unwrap();
        assert_eq!(preds.len(), 1);
        assert_eq!(store.num_edges(), 2);

        let succs = store.get_successors(&graph(), &"a".into()).await.unwrap();
        assert_eq!(succs, vec![NodeRef::new("b", NodeType::TextToText)]);
    }

    #[tokio::test]
    async fn test_graphs_do_not_collide() {
        let store = InMemoryGraphStore::new();
        let other = GraphId::from("g2");
        store.add_node(&graph(), prompt("a"));
        store.add_node(&other, NodeRecord::new("a", NodeType::TextToText, json!({})));

        let mine = store.get_node_ref(&graph(), &"a".into()).await.unwrap().unwrap();
        let theirs = store.get_node_ref(&other, &"a".into()).await.unwrap().unwrap();
        assert_eq!(mine.node_type, NodeType::Prompt);
        assert_eq!(theirs.node_type, NodeType::TextToText);
    }

    #[tokio::test]
    async fn test_replace_graph_is_wholesale() {
        let store = InMemoryGraphStore::new();
        store.add_node(&graph(), prompt("old"));
        store.add_node(&"g2".into(), prompt("keep"));

        store
            .replace_graph(&graph(), vec![prompt("a"), prompt("b")], vec![Edge::connect("a", "b")])
            .await
            .unwrap();

        let nodes = store.list_nodes(&graph()).await.unwrap();
        let ids: Vec<_> = nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.list_nodes(&"g2".into()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_graph_rejects_dangling_edge() {
        let store = InMemoryGraphStore::new();
        store.add_node(&graph(), prompt("old"));

        let err = store
            .replace_graph(&graph(), vec![prompt("a")], vec![Edge::connect("a", "ghost")])
            .await
            .unwrap_err();
        assert!(matches!(err, InMemoryError::DanglingEdge { .. }));
        // Nothing was written.
        assert_eq!(store.list_nodes(&graph()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_node_data_merges_shallowly() {
        let store = InMemoryGraphStore::new();
        store.add_node(
            &graph(),
            NodeRecord::new("m", NodeType::ContextMerger, json!({"mode": "summary", "branchSummaries": {"h1": "x"}})),
        );

        let mut patch = serde_json::Map::new();
        patch.insert("branchSummaries".into(), json!({"h1": "x", "h2": "y"}));
        store.update_node_data(&graph(), &"m".into(), patch).await.unwrap();

        let data = store.node_data(&graph(), &"m".into()).unwrap();
        assert_eq!(data["mode"], "summary");
        assert_eq!(data["branchSummaries"]["h2"], "y");
    }

    #[tokio::test]
    async fn test_update_missing_node_fails() {
        let store = InMemoryGraphStore::new();
        let err = store
            .update_node_data(&graph(), &"nope".into(), serde_json::Map::new())
            .await
            .unwrap_err();
        assert!(matches!(err, InMemoryError::NodeNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_nodes_by_ids_skips_missing() {
        let store = InMemoryGraphStore::new();
        store.add_node(&graph(), prompt("b"));
        store.add_node(&graph(), prompt("a"));

        let records = store
            .get_nodes_by_ids(&graph(), &["b".into(), "zz".into(), "a".into()])
            .await
            .unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
