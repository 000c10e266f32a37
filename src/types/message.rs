//! Conversation messages produced by history construction.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::data::{ParallelModel, Usage};
use super::node::{NodeId, NodeType};

/// Speaker of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,
    /// User turn (prompt context).
    User,
    /// Model turn (stored reply).
    Assistant,
}

impl Role {
    /// Lowercase label used in formatted transcripts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// An image attachment.
    Image {
        /// Storage identifier.
        file_id: String,
        /// MIME type, always `image/*`.
        mime_type: String,
        /// Base64 payload when content inclusion is enabled.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
    /// A non-image file attachment.
    File {
        /// Storage identifier.
        file_id: String,
        /// Original file name.
        name: String,
        /// MIME type.
        mime_type: String,
        /// Base64 payload when content inclusion is enabled.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<String>,
    },
}

impl ContentBlock {
    /// Text block shorthand.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// The text of a text block.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A single parallel model's answer, attached to PARALLELIZATION assistant turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelResult {
    /// Entry id within the node.
    pub id: String,
    /// Model identifier.
    pub model: String,
    /// The model's reply.
    pub reply: String,
    /// Token usage, when recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl From<&ParallelModel> for ParallelResult {
    fn from(model: &ParallelModel) -> Self {
        Self {
            id: model.id.clone(),
            model: model.model.clone(),
            reply: model.reply.clone(),
            usage: model.usage,
        }
    }
}

/// Auxiliary data carried alongside a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Node the message was produced from.
    pub node_id: NodeId,
    /// Type of that node.
    pub node_type: NodeType,
    /// Raw per-model answers of a PARALLELIZATION node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_results: Option<Vec<ParallelResult>>,
    /// Branch summaries of a CONTEXT_MERGER node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_summaries: Option<BTreeMap<String, String>>,
}

impl MessageMetadata {
    /// Metadata naming the source node only.
    pub fn for_node(node_id: NodeId, node_type: NodeType) -> Self {
        Self {
            node_id,
            node_type,
            parallel_results: None,
            branch_summaries: None,
        }
    }
}

/// A conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Speaker.
    pub role: Role,
    /// Content blocks, text first.
    pub content: Vec<ContentBlock>,
    /// Source node information.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// A single text-block message.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::text(text)],
            metadata: None,
        }
    }

    /// System message shorthand.
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(Role::System, text)
    }

    /// User message shorthand.
    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    /// Assistant message shorthand.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Concatenated text of all text blocks.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
