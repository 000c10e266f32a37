//! The context kernel facade.

use std::sync::Arc;

use crate::collab::{ModelClient, RepositoryMirror, SettingsProvider};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::history::{HistoryOptions, MessageHistoryBuilder, RoutingPrompt};
use crate::merger::ContextMergerEngine;
use crate::plan::ExecutionPlanBuilder;
use crate::store::GraphStore;
use crate::traversal::GraphTraversal;
use crate::types::{Edge, ExecutionPlan, GraphId, Message, NodeId, NodeRecord, NodeSelector, PlanSelection};

/// One entry point for every kernel operation over a shared store.
pub struct ContextKernel<S: GraphStore> {
    store: Arc<S>,
    traversal: GraphTraversal<S>,
    plans: ExecutionPlanBuilder<S>,
    history: MessageHistoryBuilder<S>,
    merger: ContextMergerEngine<S>,
}

impl<S: GraphStore + 'static> ContextKernel<S> {
    /// Wire a kernel from its collaborators.
    pub fn new(
        store: Arc<S>,
        settings: Arc<dyn SettingsProvider>,
        model: Arc<dyn ModelClient>,
        config: KernelConfig,
    ) -> Self {
        let config = Arc::new(config);
        let traversal = GraphTraversal::new(Arc::clone(&store));
        let history = MessageHistoryBuilder::new(traversal.clone(), settings, Arc::clone(&config));
        let merger = ContextMergerEngine::new(history.clone(), model, config);

        Self {
            plans: ExecutionPlanBuilder::with_traversal(traversal.clone()),
            store,
            traversal,
            history,
            merger,
        }
    }

    /// Resolve GITHUB context through `mirror` when a graph enables auto-pull.
    pub fn with_mirror(mut self, mirror: Arc<dyn RepositoryMirror>) -> Self {
        self.history = self.history.with_mirror(mirror);
        self.merger = self.merger.with_history(self.history.clone());
        self
    }

    /// The backing store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Traversal primitives.
    pub fn traversal(&self) -> &GraphTraversal<S> {
        &self.traversal
    }

    /// History builder.
    pub fn history(&self) -> &MessageHistoryBuilder<S> {
        &self.history
    }

    /// Merger engine.
    pub fn merger(&self) -> &ContextMergerEngine<S> {
        &self.merger
    }

    /// Validate `(direction, node)` and build the execution plan.
    pub async fn get_execution_plan_by_node(
        &self,
        graph_id: &GraphId,
        direction: &str,
        node: Option<&NodeSelector>,
    ) -> KernelResult<ExecutionPlan> {
        let selection = PlanSelection::parse(direction, node)?;
        self.plans.build(graph_id, &selection).await
    }

    /// See [`MessageHistoryBuilder::construct_message_history`].
    pub async fn construct_message_history(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        options: &HistoryOptions,
    ) -> KernelResult<Vec<Message>> {
        self.history.construct_message_history(graph_id, node_id, options).await
    }

    /// See [`MessageHistoryBuilder::construct_parallelization_aggregator_prompt`].
    pub async fn construct_parallelization_aggregator_prompt(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        options: &HistoryOptions,
    ) -> KernelResult<Vec<Message>> {
        self.history
            .construct_parallelization_aggregator_prompt(graph_id, node_id, options)
            .await
    }

    /// See [`MessageHistoryBuilder::construct_routing_prompt`].
    pub async fn construct_routing_prompt(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> KernelResult<RoutingPrompt> {
        self.history.construct_routing_prompt(graph_id, node_id).await
    }

    /// See [`ContextMergerEngine::construct_merged_history`].
    pub async fn construct_merged_history(
        &self,
        graph_id: &GraphId,
        merger_id: &NodeId,
        system_prompt: &str,
    ) -> KernelResult<Vec<Message>> {
        self.merger
            .construct_merged_history(graph_id, merger_id, system_prompt)
            .await
    }

    /// Replace a graph's nodes and edges wholesale.
    pub async fn replace_graph(
        &self,
        graph_id: &GraphId,
        nodes: Vec<NodeRecord>,
        edges: Vec<Edge>,
    ) -> KernelResult<()> {
        self.store
            .replace_graph(graph_id, nodes, edges)
            .await
            .map_err(KernelError::from_store)
    }

    /// Whether the store is reachable.
    pub async fn is_healthy(&self) -> bool {
        self.store.is_healthy().await
    }
}
