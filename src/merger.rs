//! Context merger engine.
//!
//! A CONTEXT_MERGER node joins several incoming branches into one user
//! turn. Each immediate parent is a branch head; its full history is rebuilt
//! and then rendered whole (`full`), truncated (`last_n`) or summarized
//! (`summary`, cached per head on the merger node).
//!
//! Any branch failure fails the whole merge. A merge that silently dropped a
//! branch would hand the model a corrupted context.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::collab::{GenerationParams, ModelClient};
use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::history::{HistoryOptions, HistoryView, MessageHistoryBuilder, ThinkingPolicy};
use crate::store::GraphStore;
use crate::types::{
    GraphId, MergeMode, MergerData, Message, MessageMetadata, NodeData, NodeId, NodeType, Role,
};

fn format_message(message: &Message) -> String {
    format!("<message role=\"{}\">{}</message>", message.role.as_str(), message.text_content())
}

/// Render a branch's messages as one tagged block.
pub fn format_branch(head: &NodeId, messages: &[Message]) -> String {
    let body = messages.iter().map(format_message).collect::<Vec<_>>().join("\n");
    format!("<branch id=\"{}\">\n{}\n</branch>", head, body)
}

fn format_summary(head: &NodeId, summary: &str) -> String {
    format!("<branch id=\"{}\">{}</branch>", head, summary)
}

fn wrap_merged(blocks: &[String]) -> String {
    format!("<merged_context>\n{}\n</merged_context>", blocks.join("\n"))
}

/// Builds merged histories for CONTEXT_MERGER nodes.
pub struct ContextMergerEngine<S: GraphStore> {
    history: MessageHistoryBuilder<S>,
    model: Arc<dyn ModelClient>,
    config: Arc<KernelConfig>,
}

impl<S: GraphStore + 'static> ContextMergerEngine<S> {
    /// Create an engine.
    pub fn new(
        history: MessageHistoryBuilder<S>,
        model: Arc<dyn ModelClient>,
        config: Arc<KernelConfig>,
    ) -> Self {
        Self { history, model, config }
    }

    /// Swap the history builder branches are rebuilt with.
    pub fn with_history(mut self, history: MessageHistoryBuilder<S>) -> Self {
        self.history = history;
        self
    }

    fn branch_options() -> HistoryOptions {
        HistoryOptions {
            add_current_node: true,
            system_prompt: String::new(),
            thinking: Some(ThinkingPolicy::StripAll),
            include_file_content: false,
            view: HistoryView::Full,
        }
    }

    /// Load the merger payload and the key its summary cache is stored under.
    async fn load_merger(
        &self,
        graph_id: &GraphId,
        merger_id: &NodeId,
    ) -> KernelResult<(MergerData, &'static str)> {
        let record = self
            .history
            .traversal()
            .store()
            .get_nodes_by_ids(graph_id, std::slice::from_ref(merger_id))
            .await
            .map_err(KernelError::from_store)?
            .into_iter()
            .next()
            .ok_or_else(|| KernelError::not_found("context merger", merger_id))?;

        // Older nodes use snake_case keys; writing the other spelling would
        // leave two keys for one field.
        let summary_key = if record.data.get("branch_summaries").is_some() {
            "branch_summaries"
        } else {
            "branchSummaries"
        };

        match NodeData::from_record(&record)? {
            NodeData::ContextMerger(data) => Ok((data, summary_key)),
            _ => Err(KernelError::validation(format!(
                "node {} is {}, not CONTEXT_MERGER",
                merger_id, record.node_type
            ))),
        }
    }

    async fn branch_history(&self, graph_id: &GraphId, head: &NodeId) -> KernelResult<Vec<Message>> {
        let mut messages = self
            .history
            .construct_message_history(graph_id, head, &Self::branch_options())
            .await?;
        messages.retain(|m| m.role != Role::System);
        Ok(messages)
    }

    async fn summarize(&self, head: &NodeId, block: String) -> KernelResult<String> {
        let messages = [
            Message::system(self.config.summary_prompt.clone()),
            Message::user(block),
        ];
        let summary = self
            .model
            .generate_non_streaming(&messages, &self.config.summary_model, &GenerationParams::default())
            .await?;

        tracing::info!(
            target: "context_kernel::metrics",
            head = %head,
            model = %self.config.summary_model,
            summary_chars = summary.len(),
            "Branch summarized"
        );
        Ok(summary.trim().to_string())
    }

    /// Build the merged context of a CONTEXT_MERGER node.
    ///
    /// Returns an optional system message followed by one user message that
    /// carries every branch, tagged with the merger's id and type. In summary
    /// mode, summaries missing from the cache are computed and written back
    /// to the merger node before returning.
    pub async fn construct_merged_history(
        &self,
        graph_id: &GraphId,
        merger_id: &NodeId,
        system_prompt: &str,
    ) -> KernelResult<Vec<Message>> {
        let (merger, summary_key) = self.load_merger(graph_id, merger_id).await?;
        let heads: Vec<NodeId> = self
            .history
            .traversal()
            .get_immediate_parents(graph_id, merger_id)
            .await?
            .into_iter()
            .map(|n| n.id)
            .collect();

        let cached = |head: &NodeId| merger.branch_summaries.contains_key(head.as_str());
        let to_fetch: Vec<&NodeId> = heads
            .iter()
            .filter(|h| merger.mode != MergeMode::Summary || !cached(*h))
            .collect();

        let limit = self.config.merge_concurrency.max(1);
        let pending: Vec<_> = to_fetch.iter().map(|h| self.branch_history(graph_id, h)).collect();
        let histories: Vec<Vec<Message>> = stream::iter(pending)
            .buffered(limit)
            .try_collect()
            .await?;
        let histories: BTreeMap<&NodeId, Vec<Message>> = to_fetch.into_iter().zip(histories).collect();

        let mut summaries = merger.branch_summaries.clone();
        let blocks: Vec<String> = match merger.mode {
            MergeMode::Full => heads
                .iter()
                .map(|h| format_branch(h, histories.get(h).map(Vec::as_slice).unwrap_or_default()))
                .collect(),
            MergeMode::LastN => heads
                .iter()
                .map(|h| {
                    let messages = histories.get(h).map(Vec::as_slice).unwrap_or_default();
                    let start = messages.len().saturating_sub(merger.last_n);
                    format_branch(h, &messages[start..])
                })
                .collect(),
            MergeMode::Summary => {
                let pending: Vec<_> = histories
                    .iter()
                    .map(|(h, messages)| async move {
                        let summary = self.summarize(h, format_branch(h, messages)).await?;
                        Ok::<_, KernelError>((*h, summary))
                    })
                    .collect();
                let fresh: Vec<(&NodeId, String)> = stream::iter(pending)
                .buffered(limit)
                .try_collect()
                .await?;

                if !fresh.is_empty() {
                    for (head, summary) in fresh {
                        summaries.insert(head.to_string(), summary);
                    }
                    self.persist_summaries(graph_id, merger_id, summary_key, &summaries).await?;
                }

                heads
                    .iter()
                    .map(|h| format_summary(h, summaries.get(h.as_str()).map(String::as_str).unwrap_or_default()))
                    .collect()
            }
        };

        let mut metadata = MessageMetadata::for_node(merger_id.clone(), NodeType::ContextMerger);
        if merger.mode == MergeMode::Summary && !summaries.is_empty() {
            metadata.branch_summaries = Some(summaries);
        }

        let mut messages = Vec::with_capacity(2);
        if !system_prompt.is_empty() {
            messages.push(Message::system(system_prompt));
        }
        messages.push(Message::user(wrap_merged(&blocks)).with_metadata(metadata));

        tracing::info!(
            target: "context_kernel::metrics",
            graph_id = %graph_id,
            node_id = %merger_id,
            mode = ?merger.mode,
            branches = heads.len(),
            "Context merged"
        );
        Ok(messages)
    }

    async fn persist_summaries(
        &self,
        graph_id: &GraphId,
        merger_id: &NodeId,
        key: &str,
        summaries: &BTreeMap<String, String>,
    ) -> KernelResult<()> {
        let mut patch = serde_json::Map::new();
        patch.insert(
            key.to_string(),
            serde_json::to_value(summaries).map_err(|e| KernelError::validation(e.to_string()))?,
        );
        self.history
            .traversal()
            .store()
            .update_node_data(graph_id, merger_id, patch)
            .await
            .map_err(KernelError::from_store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_branch() {
        let messages = vec![Message::user("hi"), Message::assistant("hello")];
        assert_eq!(
            format_branch(&"h1".into(), &messages),
            "<branch id=\"h1\">\n<message role=\"user\">hi</message>\n<message role=\"assistant\">hello</message>\n</branch>"
        );
    }

    #[test]
    fn test_wrap_merged() {
        let text = wrap_merged(&[format_summary(&"h1".into(), "short")]);
        assert_eq!(text, "<merged_context>\n<branch id=\"h1\">short</branch>\n</merged_context>");
    }
}
