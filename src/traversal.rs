//! Graph traversal primitives.
//!
//! Every query is a breadth-first walk over the store's adjacency, one store
//! call per expanded node. BFS hands out each node at its minimal distance;
//! results are ordered by `(distance, node id)`.
//!
//! Read queries never fail on a missing start node: they return an empty
//! result and leave it to the caller to decide whether that is an error.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{KernelError, KernelResult};
use crate::store::GraphStore;
use crate::types::{GraphId, NodeAtDistance, NodeId, NodeRef, NodeType};

/// Which edges a walk follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkDirection {
    /// Incoming edges (towards ancestors).
    Backward,
    /// Outgoing edges (towards descendants).
    Forward,
}

/// Result of a nearest-descendant lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NearestChildren {
    /// No descendant matches.
    None,
    /// Exactly one descendant is nearest.
    One(NodeAtDistance),
    /// Two or more descendants tie at the minimal distance (ordered by id).
    Many(Vec<NodeAtDistance>),
}

impl NearestChildren {
    /// The ids in this result.
    pub fn ids(&self) -> Vec<NodeId> {
        match self {
            Self::None => Vec::new(),
            Self::One(n) => vec![n.id.clone()],
            Self::Many(ns) => ns.iter().map(|n| n.id.clone()).collect(),
        }
    }

    /// Whether nothing matched.
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// Reverse a nearest-first list into chronological (oldest-first) order.
///
/// Traversal results run from the target outwards; conversation order runs
/// the other way. Every call site that needs chronology goes through here.
pub fn oldest_first<T>(mut nearest_first: Vec<T>) -> Vec<T> {
    nearest_first.reverse();
    nearest_first
}

fn sort_by_distance(nodes: &mut [NodeAtDistance]) {
    nodes.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
}

/// Traversal primitives over a [`GraphStore`].
pub struct GraphTraversal<S: GraphStore> {
    store: Arc<S>,
}

impl<S: GraphStore> Clone for GraphTraversal<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: GraphStore + 'static> GraphTraversal<S> {
    /// Create traversal primitives over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Resolve a node's id and type, `None` if absent.
    pub async fn node(&self, graph_id: &GraphId, node_id: &NodeId) -> KernelResult<Option<NodeRef>> {
        self.store
            .get_node_ref(graph_id, node_id)
            .await
            .map_err(KernelError::from_store)
    }

    async fn neighbors(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        direction: WalkDirection,
    ) -> KernelResult<Vec<NodeRef>> {
        let result = match direction {
            WalkDirection::Backward => self.store.get_predecessors(graph_id, node_id).await,
            WalkDirection::Forward => self.store.get_successors(graph_id, node_id).await,
        };
        result.map_err(KernelError::from_store)
    }

    /// Breadth-first walk from `start`, reporting every reached node
    /// (including `start` at distance 0) at its minimal distance.
    ///
    /// Nodes for which `expand` returns false are reported but not walked
    /// through. `start` itself is always expanded.
    pub async fn walk<F>(
        &self,
        graph_id: &GraphId,
        start: &NodeRef,
        direction: WalkDirection,
        expand: F,
    ) -> KernelResult<Vec<NodeAtDistance>>
    where
        F: Fn(&NodeRef) -> bool,
    {
        let mut seen: BTreeSet<NodeId> = BTreeSet::new();
        let mut reached = vec![NodeAtDistance {
            id: start.id.clone(),
            node_type: start.node_type.clone(),
            distance: 0,
        }];
        seen.insert(start.id.clone());

        let mut frontier = vec![start.clone()];
        let mut distance = 0u32;

        while !frontier.is_empty() {
            distance += 1;
            // BTreeMap keeps the next level ordered by id.
            let mut next: BTreeMap<NodeId, NodeRef> = BTreeMap::new();

            for node in &frontier {
                for neighbor in self.neighbors(graph_id, &node.id, direction).await? {
                    if seen.insert(neighbor.id.clone()) {
                        reached.push(NodeAtDistance {
                            id: neighbor.id.clone(),
                            node_type: neighbor.node_type.clone(),
                            distance,
                        });
                        if expand(&neighbor) {
                            next.insert(neighbor.id.clone(), neighbor);
                        }
                    }
                }
            }

            frontier = next.into_values().collect();
        }

        Ok(reached)
    }

    /// Every ancestor of `node_id` (following edges backward zero or more
    /// hops) whose type is in `types`.
    ///
    /// Distance 0 is the node itself, included only if its type matches.
    pub async fn get_ancestor_by_types(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        types: &[NodeType],
    ) -> KernelResult<Vec<NodeAtDistance>> {
        let Some(start) = self.node(graph_id, node_id).await? else {
            tracing::debug!(graph_id = %graph_id, node_id = %node_id, "Ancestor query on missing node");
            return Ok(Vec::new());
        };

        let mut found: Vec<NodeAtDistance> = self
            .walk(graph_id, &start, WalkDirection::Backward, |_| true)
            .await?
            .into_iter()
            .filter(|n| types.contains(&n.node_type))
            .collect();
        sort_by_distance(&mut found);

        tracing::debug!(
            graph_id = %graph_id,
            node_id = %node_id,
            found = found.len(),
            "Resolved ancestors by type"
        );
        Ok(found)
    }

    /// The nearest strict ancestor whose type is in `types`, ties broken by id.
    pub async fn get_parent_node_of_type(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        types: &[NodeType],
    ) -> KernelResult<Option<NodeAtDistance>> {
        Ok(self
            .get_ancestor_by_types(graph_id, node_id, types)
            .await?
            .into_iter()
            .find(|n| n.distance > 0))
    }

    /// The nearest strict descendants whose type is in `types`.
    pub async fn get_children_node_of_type(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        types: &[NodeType],
    ) -> KernelResult<NearestChildren> {
        let Some(start) = self.node(graph_id, node_id).await? else {
            return Ok(NearestChildren::None);
        };

        let mut found: Vec<NodeAtDistance> = self
            .walk(graph_id, &start, WalkDirection::Forward, |_| true)
            .await?
            .into_iter()
            .filter(|n| n.distance > 0 && types.contains(&n.node_type))
            .collect();
        sort_by_distance(&mut found);

        let Some(nearest) = found.first().map(|n| n.distance) else {
            return Ok(NearestChildren::None);
        };
        found.retain(|n| n.distance == nearest);

        Ok(if found.len() == 1 {
            NearestChildren::One(found.remove(0))
        } else {
            NearestChildren::Many(found)
        })
    }

    /// Prompt-like nodes attached to a generator without crossing another
    /// generator.
    ///
    /// A prompt node qualifies if at least one backward path to it has no
    /// generator strictly between the two endpoints; it is reported at the
    /// shortest such path. Generators are reached but never walked through,
    /// so upstream generators' own prompts stay with their own turns.
    pub async fn get_connected_prompt_nodes(
        &self,
        graph_id: &GraphId,
        generator_id: &NodeId,
    ) -> KernelResult<Vec<NodeAtDistance>> {
        let Some(start) = self.node(graph_id, generator_id).await? else {
            return Ok(Vec::new());
        };

        let mut found: Vec<NodeAtDistance> = self
            .walk(graph_id, &start, WalkDirection::Backward, |n| !n.node_type.is_generator())
            .await?
            .into_iter()
            .filter(|n| n.distance > 0 && n.node_type.is_prompt_like())
            .collect();
        sort_by_distance(&mut found);

        tracing::debug!(
            graph_id = %graph_id,
            node_id = %generator_id,
            prompts = found.len(),
            "Resolved connected prompt nodes"
        );
        Ok(found)
    }

    /// One-hop predecessors, ordered by id.
    pub async fn get_immediate_parents(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> KernelResult<Vec<NodeRef>> {
        let mut parents = self.neighbors(graph_id, node_id, WalkDirection::Backward).await?;
        parents.sort_by(|a, b| a.id.cmp(&b.id));
        parents.dedup_by(|a, b| a.id == b.id);
        Ok(parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryGraphStore;
    use crate::types::{Edge, NodeRecord};
    use serde_json::json;

    fn graph() -> GraphId {
        GraphId::from("g")
    }

    fn store_with(nodes: &[(&str, NodeType)], edges: &[(&str, &str)]) -> Arc<InMemoryGraphStore> {
        let store = InMemoryGraphStore::new();
        for (id, t) in nodes {
            store.add_node(&graph(), NodeRecord::new(*id, t.clone(), json!({})));
        }
        for (s, t) in edges {
            store.add_edge(&graph(), Edge::connect(*s, *t));
        }
        Arc::new(store)
    }

    fn ids(nodes: &[NodeAtDistance]) -> Vec<(&str, u32)> {
        nodes.iter().map(|n| (n.id.as_str(), n.distance)).collect()
    }

    #[tokio::test]
    async fn test_ancestors_include_self_at_zero() {
        let store = store_with(
            &[("a", NodeType::Prompt), ("b", NodeType::TextToText), ("c", NodeType::Prompt), ("d", NodeType::TextToText)],
            &[("a", "b"), ("b", "c"), ("c", "d")],
        );
        let traversal = GraphTraversal::new(store);

        let gens = traversal
            .get_ancestor_by_types(&graph(), &"d".into(), NodeType::generators())
            .await
            .unwrap();
        assert_eq!(ids(&gens), vec![("d", 0), ("b", 2)]);

        let chronological = oldest_first(gens);
        assert_eq!(chronological[0].id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_ancestor_reports_minimal_distance() {
        // a -> b -> c, a -> c
        let store = store_with(
            &[("a", NodeType::Prompt), ("b", NodeType::Prompt), ("c", NodeType::TextToText)],
            &[("a", "b"), ("b", "c"), ("a", "c")],
        );
        let traversal = GraphTraversal::new(store);

        let found = traversal
            .get_ancestor_by_types(&graph(), &"c".into(), &[NodeType::Prompt])
            .await
            .unwrap();
        assert_eq!(ids(&found), vec![("a", 1), ("b", 1)]);
    }

    #[tokio::test]
    async fn test_missing_node_is_empty() {
        let traversal = GraphTraversal::new(store_with(&[], &[]));
        let found = traversal
            .get_ancestor_by_types(&graph(), &"ghost".into(), NodeType::generators())
            .await
            .unwrap();
        assert!(found.is_empty());
        assert!(traversal
            .get_children_node_of_type(&graph(), &"ghost".into(), &[NodeType::Prompt])
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_parent_is_strictly_nearest() {
        // p1 -> p2 -> g
        let store = store_with(
            &[("p1", NodeType::Prompt), ("p2", NodeType::Prompt), ("g", NodeType::Prompt)],
            &[("p1", "p2"), ("p2", "g")],
        );
        let traversal = GraphTraversal::new(store);

        let parent = traversal
            .get_parent_node_of_type(&graph(), &"g".into(), &[NodeType::Prompt])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(parent.id.as_str(), "p2");
        assert_eq!(parent.distance, 1);

        let none = traversal
            .get_parent_node_of_type(&graph(), &"g".into(), &[NodeType::Routing])
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_children_ties_return_all() {
        // r -> x -> g1, r -> y -> g2
        let store = store_with(
            &[
                ("r", NodeType::Prompt),
                ("x", NodeType::Prompt),
                ("y", NodeType::Prompt),
                ("g1", NodeType::TextToText),
                ("g2", NodeType::TextToText),
            ],
            &[("r", "x"), ("x", "g1"), ("r", "y"), ("y", "g2")],
        );
        let traversal = GraphTraversal::new(Arc::clone(&store));

        let children = traversal
            .get_children_node_of_type(&graph(), &"r".into(), NodeType::generators())
            .await
            .unwrap();
        assert_eq!(children.ids(), vec![NodeId::from("g1"), NodeId::from("g2")]);

        store.add_node(&graph(), NodeRecord::new("g3", NodeType::Routing, json!({})));
        store.add_edge(&graph(), Edge::connect("r", "g3"));
        let children = traversal
            .get_children_node_of_type(&graph(), &"r".into(), NodeType::generators())
            .await
            .unwrap();
        assert!(matches!(children, NearestChildren::One(ref n) if n.id.as_str() == "g3"));
    }

    #[tokio::test]
    async fn test_connected_prompts_order_and_distance() {
        // p1 -> p2 -> b
        let store = store_with(
            &[("p1", NodeType::Prompt), ("p2", NodeType::Prompt), ("b", NodeType::TextToText)],
            &[("p1", "p2"), ("p2", "b")],
        );
        let traversal = GraphTraversal::new(store);

        let prompts = traversal.get_connected_prompt_nodes(&graph(), &"b".into()).await.unwrap();
        assert_eq!(ids(&prompts), vec![("p2", 1), ("p1", 2)]);
    }

    #[tokio::test]
    async fn test_connected_prompts_do_not_cross_generators() {
        // a -> b(gen) -> c -> d(gen)
        let store = store_with(
            &[("a", NodeType::Prompt), ("b", NodeType::TextToText), ("c", NodeType::Github), ("d", NodeType::Parallelization)],
            &[("a", "b"), ("b", "c"), ("c", "d")],
        );
        let traversal = GraphTraversal::new(store);

        let prompts = traversal.get_connected_prompt_nodes(&graph(), &"d".into()).await.unwrap();
        assert_eq!(ids(&prompts), vec![("c", 1)]);
    }

    #[tokio::test]
    async fn test_connected_prompts_keep_node_with_one_valid_path() {
        // p -> g(gen) -> x; p -> y; y, x -> t
        let store = store_with(
            &[
                ("p", NodeType::Prompt),
                ("g", NodeType::TextToText),
                ("x", NodeType::Prompt),
                ("y", NodeType::FilePrompt),
                ("t", NodeType::TextToText),
            ],
            &[("p", "g"), ("g", "x"), ("p", "y"), ("x", "t"), ("y", "t")],
        );
        let traversal = GraphTraversal::new(store);

        let prompts = traversal.get_connected_prompt_nodes(&graph(), &"t".into()).await.unwrap();
        assert_eq!(ids(&prompts), vec![("x", 1), ("y", 1), ("p", 2)]);
    }

    #[tokio::test]
    async fn test_merger_is_transparent() {
        // p -> m(merger) -> g
        let store = store_with(
            &[("p", NodeType::Prompt), ("m", NodeType::ContextMerger), ("g", NodeType::TextToText)],
            &[("p", "m"), ("m", "g")],
        );
        let traversal = GraphTraversal::new(store);

        let prompts = traversal.get_connected_prompt_nodes(&graph(), &"g".into()).await.unwrap();
        assert_eq!(ids(&prompts), vec![("p", 2)]);
    }

    #[tokio::test]
    async fn test_immediate_parents() {
        let store = store_with(
            &[("h2", NodeType::TextToText), ("h1", NodeType::TextToText), ("m", NodeType::ContextMerger)],
            &[("h2", "m"), ("h1", "m")],
        );
        store.add_edge(&graph(), Edge::new("dup", "h1", "m"));
        let traversal = GraphTraversal::new(store);

        let parents = traversal.get_immediate_parents(&graph(), &"m".into()).await.unwrap();
        let parent_ids: Vec<_> = parents.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(parent_ids, vec!["h1", "h2"]);
    }

    #[test]
    fn test_oldest_first_reverses() {
        assert_eq!(oldest_first(vec![1, 2, 3]), vec![3, 2, 1]);
        assert!(oldest_first(Vec::<u8>::new()).is_empty());
    }
}
