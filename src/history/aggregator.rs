//! Aggregator prompt for PARALLELIZATION nodes.

use super::{HistoryOptions, MessageHistoryBuilder};
use crate::error::{KernelError, KernelResult};
use crate::store::GraphStore;
use crate::types::{GraphId, Message, NodeData, NodeId};

impl<S: GraphStore + 'static> MessageHistoryBuilder<S> {
    /// Messages for the aggregator call of a PARALLELIZATION node.
    ///
    /// The system message holds the aggregator instructions followed by every
    /// parallel model's reply under an `Answer N:` heading. The node's own
    /// attached context follows as the user turn so the aggregator sees the
    /// original request. The node's stored reply is never included.
    ///
    /// Only `thinking` and `include_file_content` of `options` apply.
    pub async fn construct_parallelization_aggregator_prompt(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
        options: &HistoryOptions,
    ) -> KernelResult<Vec<Message>> {
        let record = self.fetch_record(graph_id, node_id).await?;
        let data = match NodeData::from_record(&record)? {
            NodeData::Parallelization(data) => data,
            _ => {
                return Err(KernelError::validation(format!(
                    "node {} is {}, not PARALLELIZATION",
                    node_id, record.node_type
                )))
            }
        };

        let policy = self.thinking_policy(graph_id, options.thinking);
        let instructions = data
            .aggregator
            .prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(self.config.aggregator_prompt.as_str());

        let mut system = instructions.to_string();
        for (i, model) in data.models.iter().enumerate() {
            system.push_str(&format!("\n\nAnswer {}:\n{}", i + 1, policy.apply(&model.reply)));
        }

        let mut messages = vec![Message::system(system)];
        let context = self
            .attached_context(
                graph_id,
                node_id,
                self.settings.generation_config(graph_id),
                options.include_file_content,
            )
            .await?;
        if !context.is_empty() {
            messages.push(context.into_message());
        }

        tracing::debug!(
            graph_id = %graph_id,
            node_id = %node_id,
            answers = data.models.len(),
            "Aggregator prompt constructed"
        );
        Ok(messages)
    }
}
