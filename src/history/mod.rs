//! Message history construction.
//!
//! Rebuilds the conversation a model call at a given node should see:
//!
//! ```text
//! system? , user(G1 context) , assistant(G1 reply) , ... , user(Gn context) [, assistant(Gn reply)]
//! ```
//!
//! `G1..Gn` are the generator ancestors of the target, oldest first. Each
//! generator's user turn is built from the prompt-like nodes attached to it
//! directly (see [`GraphTraversal::get_connected_prompt_nodes`]); upstream
//! generators show up as their own turns, never inside a later prompt.

pub mod clean;
pub mod context;
pub mod aggregator;
pub mod routing;

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::collab::{RepositoryMirror, SettingsProvider};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::store::GraphStore;
use crate::traversal::{oldest_first, GraphTraversal};
use crate::types::{
    GraphId, Message, MessageMetadata, NodeData, NodeId, NodeRecord, NodeType, ParallelResult, Role,
};

pub use clean::ThinkingPolicy;
pub use context::AttachedContext;
pub use routing::{RouteSchema, RoutingPrompt};

/// How much of a generator's stored output an assistant turn carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryView {
    /// Reply plus auxiliary data (per-model answers of PARALLELIZATION nodes).
    #[default]
    Full,
    /// Reply text only.
    Reply,
}

/// Options for [`MessageHistoryBuilder::construct_message_history`].
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HistoryOptions {
    /// Include the target node's own reply as the final assistant turn.
    pub add_current_node: bool,
    /// Prepended as a system message when non-empty.
    pub system_prompt: String,
    /// Thinking-segment handling; `None` follows the graph's `includeThinking` flag.
    pub thinking: Option<ThinkingPolicy>,
    /// Inline base64 file content into attachment blocks.
    pub include_file_content: bool,
    /// Assistant turn detail.
    pub view: HistoryView,
}

/// Builds message histories, aggregator prompts and routing prompts.
pub struct MessageHistoryBuilder<S: GraphStore> {
    traversal: GraphTraversal<S>,
    settings: Arc<dyn SettingsProvider>,
    mirror: Option<Arc<dyn RepositoryMirror>>,
    config: Arc<KernelConfig>,
}

impl<S: GraphStore> Clone for MessageHistoryBuilder<S> {
    fn clone(&self) -> Self {
        Self {
            traversal: self.traversal.clone(),
            settings: Arc::clone(&self.settings),
            mirror: self.mirror.clone(),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: GraphStore + 'static> MessageHistoryBuilder<S> {
    /// Create a builder.
    pub fn new(
        traversal: GraphTraversal<S>,
        settings: Arc<dyn SettingsProvider>,
        config: Arc<KernelConfig>,
    ) -> Self {
        Self {
            traversal,
            settings,
            mirror: None,
            config,
        }
    }

    /// Resolve GITHUB nodes through `mirror` when auto-pull is on.
    pub fn with_mirror(mut self, mirror: Arc<dyn RepositoryMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Traversal primitives in use.
    pub fn traversal(&self) -> &GraphTraversal<S> {
        &self.traversal
    }

    fn thinking_policy(&self, graph_id: &GraphId, requested: Option<ThinkingPolicy>) -> ThinkingPolicy {
        requested.unwrap_or_else(|| {
            ThinkingPolicy::from_include_flag(self.settings.generation_config(graph_id).include_thinking)
        })
    }

    async fn fetch_record(&self, graph_id: &GraphId, node_id: &NodeId) -> KernelResult<NodeRecord> {
        self.traversal
            .store()
            .get_nodes_by_ids(graph_id, std::slice::from_ref(node_id))
            .await
            .map_err(KernelError::from_store)?
            .into_iter()
            .next()
            .ok_or_else(|| KernelError::not_found("node", node_id))
    }

    /// Reconstruct the conversation leading to `node_id`.
    ///
    /// Fails with `NotFound` if the node does not exist. Generators without
    /// attached prompt nodes contribute nothing.
    pub async fn construct_message_history(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        options: &HistoryOptions,
    ) -> KernelResult<Vec<Message>> {
        if self.traversal.node(graph_id, node_id).await?.is_none() {
            return Err(KernelError::not_found("node", node_id));
        }

        let generators = oldest_first(
            self.traversal
                .get_ancestor_by_types(graph_id, node_id, NodeType::generators())
                .await?,
        );

        let generation = self.settings.generation_config(graph_id);
        let policy = self.thinking_policy(graph_id, options.thinking);

        // Each generator's context is independent; order is restored by `buffered`.
        let pending: Vec<_> = generators
            .iter()
            .map(|g| self.attached_context(graph_id, &g.id, generation, options.include_file_content))
            .collect();
        let contexts: Vec<AttachedContext> = stream::iter(pending)
        .buffered(self.config.history_concurrency.max(1))
        .try_collect()
        .await?;

        let ids: Vec<NodeId> = generators.iter().map(|g| g.id.clone()).collect();
        let records: BTreeMap<NodeId, NodeRecord> = self
            .traversal
            .store()
            .get_nodes_by_ids(graph_id, &ids)
            .await
            .map_err(KernelError::from_store)?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let mut messages = Vec::with_capacity(generators.len() * 2 + 1);
        if !options.system_prompt.is_empty() {
            messages.push(Message::system(options.system_prompt.clone()));
        }

        for (generator, context) in generators.iter().zip(contexts) {
            if context.is_empty() {
                tracing::debug!(
                    graph_id = %graph_id,
                    node_id = %generator.id,
                    "Generator has no attached prompt nodes; skipped"
                );
                continue;
            }
            messages.push(context.into_message());

            let is_target = &generator.id == node_id;
            if !is_target || options.add_current_node {
                let record = records
                    .get(&generator.id)
                    .ok_or_else(|| KernelError::not_found("node", &generator.id))?;
                messages.push(assistant_turn(record, options.view, policy)?);
            }
        }

        tracing::debug!(
            target: "context_kernel::metrics",
            graph_id = %graph_id,
            node_id = %node_id,
            generators = generators.len(),
            messages = messages.len(),
            "Message history constructed"
        );
        Ok(messages)
    }
}

/// Convert a generator's stored output into an assistant message.
pub fn assistant_turn(
    record: &NodeRecord,
    view: HistoryView,
    policy: ThinkingPolicy,
) -> KernelResult<Message> {
    let mut metadata = MessageMetadata::for_node(record.id.clone(), record.node_type.clone());
    let text = match NodeData::from_record(record)? {
        NodeData::TextToText(data) => policy.apply(&data.reply),
        NodeData::Routing(data) => policy.apply(&data.reply),
        NodeData::Parallelization(data) => {
            if view == HistoryView::Full {
                metadata.parallel_results =
                    Some(data.models.iter().map(ParallelResult::from).collect());
            }
            policy.apply(&data.aggregator.reply)
        }
        _ => {
            return Err(KernelError::validation(format!(
                "{} node {} has no reply to convert into an assistant turn",
                record.node_type, record.id
            )))
        }
    };

    Ok(Message::text(Role::Assistant, text).with_metadata(metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parallelization_turn_uses_aggregator_reply() {
        let record = NodeRecord::new(
            "p",
            NodeType::Parallelization,
            json!({
                "models": [{"id": "m1", "model": "a", "reply": "one"}, {"id": "m2", "model": "b", "reply": "two"}],
                "aggregator": {"model": "agg", "reply": "<think>hmm</think>both"}
            }),
        );

        let full = assistant_turn(&record, HistoryView::Full, ThinkingPolicy::StripAll).unwrap();
        assert_eq!(full.text_content(), "both");
        let results = full.metadata.unwrap().parallel_results.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].reply, "two");

        let reply = assistant_turn(&record, HistoryView::Reply, ThinkingPolicy::Keep).unwrap();
        assert_eq!(reply.text_content(), "<think>hmm</think>both");
        assert!(reply.metadata.unwrap().parallel_results.is_none());
    }

    #[test]
    fn test_prompt_node_cannot_be_assistant_turn() {
        let record = NodeRecord::new("x", NodeType::Prompt, json!({"prompt": "hi"}));
        let err = assistant_turn(&record, HistoryView::Full, ThinkingPolicy::Keep).unwrap_err();
        assert!(matches!(err, KernelError::Validation(_)));
    }

    #[test]
    fn test_routing_turn_carries_metadata() {
        let record = NodeRecord::new("r", NodeType::Routing, json!({"model": "m", "reply": "billing"}));
        let turn = assistant_turn(&record, HistoryView::Full, ThinkingPolicy::StripAll).unwrap();
        let metadata = turn.metadata.unwrap();
        assert_eq!(metadata.node_id.as_str(), "r");
        assert_eq!(metadata.node_type, NodeType::Routing);
    }
}
