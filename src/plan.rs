//! Execution plan construction.
//!
//! ## Algorithm
//!
//! 1. Materialize the plan universe for the requested direction
//! 2. Keep the generator nodes as steps
//! 3. For each step `X`, walk backward inside the universe and stop at the
//!    first generator on every route: those generators are `X`'s dependencies
//! 4. Order steps topologically (Kahn), ties broken by node id
//! 5. Fingerprint `(graph_id, steps)` with the canonical hash
//!
//! Dependencies only ever name nodes of the same universe, so every id in a
//! `depends_on` list is itself a step.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::canonical::canonical_hash_hex;
use crate::error::{KernelError, KernelResult};
use crate::store::GraphStore;
use crate::traversal::{GraphTraversal, WalkDirection};
use crate::types::{ExecutionPlan, ExecutionStep, GraphId, NodeId, NodeType, PlanSelection};

/// Builds [`ExecutionPlan`]s.
pub struct ExecutionPlanBuilder<S: GraphStore> {
    traversal: GraphTraversal<S>,
}

impl<S: GraphStore + 'static> ExecutionPlanBuilder<S> {
    /// Create a builder over `store`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            traversal: GraphTraversal::new(store),
        }
    }

    /// Create a builder sharing existing traversal primitives.
    pub fn with_traversal(traversal: GraphTraversal<S>) -> Self {
        Self { traversal }
    }

    /// Build the plan for a validated selection.
    pub async fn build(&self, graph_id: &GraphId, selection: &PlanSelection) -> KernelResult<ExecutionPlan> {
        let universe = self.universe(graph_id, selection).await?;
        let predecessors = self.predecessors_within(graph_id, &universe).await?;

        let mut dependencies: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for (id, node_type) in &universe {
            if node_type.is_generator() {
                dependencies.insert(id.clone(), nearest_generators(id, &universe, &predecessors));
            }
        }

        let steps = topological_steps(&universe, dependencies);
        let plan_hash = canonical_hash_hex(&(graph_id, &steps));

        tracing::info!(
            target: "context_kernel::metrics",
            graph_id = %graph_id,
            direction = %selection.direction(),
            universe = universe.len(),
            steps = steps.len(),
            plan_hash = %plan_hash,
            "Execution plan built"
        );

        Ok(ExecutionPlan {
            graph_id: graph_id.clone(),
            direction: selection.direction(),
            steps,
            plan_hash,
        })
    }

    async fn closure(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        direction: WalkDirection,
        universe: &mut BTreeMap<NodeId, NodeType>,
    ) -> KernelResult<()> {
        let Some(start) = self.traversal.node(graph_id, node_id).await? else {
            tracing::debug!(graph_id = %graph_id, node_id = %node_id, "Plan root not found");
            return Ok(());
        };
        for node in self.traversal.walk(graph_id, &start, direction, |_| true).await? {
            universe.insert(node.id, node.node_type);
        }
        Ok(())
    }

    async fn universe(
        &self,
        graph_id: &GraphId,
        selection: &PlanSelection,
    ) -> KernelResult<BTreeMap<NodeId, NodeType>> {
        let mut universe = BTreeMap::new();
        match selection {
            PlanSelection::Downstream(id) => {
                self.closure(graph_id, id, WalkDirection::Forward, &mut universe).await?
            }
            PlanSelection::Upstream(id) => {
                self.closure(graph_id, id, WalkDirection::Backward, &mut universe).await?
            }
            PlanSelection::Multiple(ids) => {
                for id in ids {
                    if universe.contains_key(id) {
                        // Already inside an earlier root's closure, and so is everything below it.
                        continue;
                    }
                    self.closure(graph_id, id, WalkDirection::Forward, &mut universe).await?;
                }
            }
            PlanSelection::All => {
                let nodes = self
                    .traversal
                    .store()
                    .list_nodes(graph_id)
                    .await
                    .map_err(KernelError::from_store)?;
                universe.extend(nodes.into_iter().map(|n| (n.id, n.node_type)));
            }
        }
        Ok(universe)
    }

    async fn predecessors_within(
        &self,
        graph_id: &GraphId,
        universe: &BTreeMap<NodeId, NodeType>,
    ) -> KernelResult<BTreeMap<NodeId, Vec<NodeId>>> {
        let mut adjacency = BTreeMap::new();
        for id in universe.keys() {
            let preds = self
                .traversal
                .get_immediate_parents(graph_id, id)
                .await?
                .into_iter()
                .map(|p| p.id)
                .filter(|p| universe.contains_key(p))
                .collect();
            adjacency.insert(id.clone(), preds);
        }
        Ok(adjacency)
    }
}

/// Generators reachable backward from `target` without passing through
/// another generator.
fn nearest_generators(
    target: &NodeId,
    universe: &BTreeMap<NodeId, NodeType>,
    predecessors: &BTreeMap<NodeId, Vec<NodeId>>,
) -> BTreeSet<NodeId> {
    let mut found = BTreeSet::new();
    let mut visited: BTreeSet<&NodeId> = BTreeSet::from([target]);
    let mut stack: Vec<&NodeId> = vec![target];

    while let Some(current) = stack.pop() {
        for pred in predecessors.get(current).into_iter().flatten() {
            if !visited.insert(pred) {
                continue;
            }
            let is_generator = universe.get(pred).is_some_and(NodeType::is_generator);
            if is_generator {
                found.insert(pred.clone());
            } else {
                stack.push(pred);
            }
        }
    }

    found
}

fn topological_steps(
    universe: &BTreeMap<NodeId, NodeType>,
    dependencies: BTreeMap<NodeId, BTreeSet<NodeId>>,
) -> Vec<ExecutionStep> {
    let mut remaining: BTreeMap<&NodeId, usize> =
        dependencies.iter().map(|(id, deps)| (id, deps.len())).collect();
    let mut dependents: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();
    for (id, deps) in &dependencies {
        for dep in deps {
            dependents.entry(dep).or_default().push(id);
        }
    }

    let mut ready: BTreeSet<&NodeId> = remaining
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut order: Vec<&NodeId> = Vec::with_capacity(dependencies.len());

    while let Some(id) = ready.pop_first() {
        order.push(id);
        remaining.remove(id);
        for dependent in dependents.get(id).into_iter().flatten() {
            if let Some(count) = remaining.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if !remaining.is_empty() {
        tracing::warn!(
            unordered = remaining.len(),
            "Cycle among generator steps; appending them by id"
        );
        order.extend(remaining.keys().copied());
    }

    order
        .into_iter()
        .filter_map(|id| {
            universe.get(id).map(|node_type| ExecutionStep {
                node_id: id.clone(),
                node_type: node_type.clone(),
                depends_on: dependencies.get(id).map(|d| d.iter().cloned().collect()).unwrap_or_default(),
            })
        })
        .collect()
}
