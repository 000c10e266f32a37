//! Node identity and type labels for conversation graphs.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a graph (the namespace every node and edge lives in).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GraphId(String);

impl GraphId {
    /// Create a new GraphId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GraphId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for GraphId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifier of a node, unique only within its graph.
///
/// Implements `Ord` so traversal results can be tie-broken deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a new NodeId.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Type label of a node.
///
/// The set is open: labels this crate does not know are kept verbatim in
/// [`NodeType::Other`] and are neither generators nor prompt-like.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    /// Plain text prompt.
    Prompt,
    /// Uploaded file attachments.
    FilePrompt,
    /// Files mirrored from a source repository.
    Github,
    /// Single model text generation.
    TextToText,
    /// Fan-out to several models plus an aggregator.
    Parallelization,
    /// Model-driven route selection.
    Routing,
    /// Merges several incoming branches into one context.
    ContextMerger,
    /// Any label not covered above.
    Other(String),
}

static GENERATOR_TYPES: [NodeType; 3] = [
    NodeType::TextToText,
    NodeType::Parallelization,
    NodeType::Routing,
];

static PROMPT_LIKE_TYPES: [NodeType; 3] = [
    NodeType::Prompt,
    NodeType::FilePrompt,
    NodeType::Github,
];

impl NodeType {
    /// Parse a stored type label. Never fails; unknown labels become `Other`.
    pub fn parse(label: &str) -> Self {
        match label {
            "PROMPT" => Self::Prompt,
            "FILE_PROMPT" => Self::FilePrompt,
            "GITHUB" => Self::Github,
            "TEXT_TO_TEXT" => Self::TextToText,
            "PARALLELIZATION" => Self::Parallelization,
            "ROUTING" => Self::Routing,
            "CONTEXT_MERGER" => Self::ContextMerger,
            other => Self::Other(other.to_string()),
        }
    }

    /// The stored label for this type.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Prompt => "PROMPT",
            Self::FilePrompt => "FILE_PROMPT",
            Self::Github => "GITHUB",
            Self::TextToText => "TEXT_TO_TEXT",
            Self::Parallelization => "PARALLELIZATION",
            Self::Routing => "ROUTING",
            Self::ContextMerger => "CONTEXT_MERGER",
            Self::Other(label) => label,
        }
    }

    /// Types that represent a model invocation (executable plan steps).
    pub fn generators() -> &'static [NodeType] {
        &GENERATOR_TYPES
    }

    /// Types that only supply input context to a generator.
    pub fn prompt_like() -> &'static [NodeType] {
        &PROMPT_LIKE_TYPES
    }

    /// Whether this type is a generator.
    pub fn is_generator(&self) -> bool {
        GENERATOR_TYPES.contains(self)
    }

    /// Whether this type is prompt-like.
    pub fn is_prompt_like(&self) -> bool {
        PROMPT_LIKE_TYPES.contains(self)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for NodeType {
    fn from(label: String) -> Self {
        Self::parse(&label)
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        node_type.as_str().to_string()
    }
}

/// A node reference as the topology layer sees it: id plus type label.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    /// Node identifier.
    pub id: NodeId,
    /// Node type label.
    pub node_type: NodeType,
}

impl NodeRef {
    /// Create a new node reference.
    pub fn new(id: impl Into<NodeId>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
        }
    }
}

/// A node found by a traversal, annotated with its distance (edge count)
/// from the node the traversal started at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAtDistance {
    /// Node identifier.
    pub id: NodeId,
    /// Node type label.
    pub node_type: NodeType,
    /// Shortest qualifying path length from the start node.
    pub distance: u32,
}

/// A persisted node: id, type label and the raw `data` payload.
///
/// `data` stays untyped here; [`crate::types::NodeData::from_record`] is the
/// single place it is validated into a typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node identifier.
    pub id: NodeId,
    /// Node type label.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Raw payload, shape depends on `node_type`.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl NodeRecord {
    /// Create a new node record.
    pub fn new(id: impl Into<NodeId>, node_type: NodeType, data: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            node_type,
            data,
        }
    }

    /// The topology view of this record.
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::new(self.id.clone(), self.node_type.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_round_trips_known_labels() {
        for label in [
            "PROMPT",
            "FILE_PROMPT",
            "GITHUB",
            "TEXT_TO_TEXT",
            "PARALLELIZATION",
            "ROUTING",
            "CONTEXT_MERGER",
        ] {
            assert_eq!(NodeType::parse(label).as_str(), label);
        }
    }

    #[test]
    fn test_unknown_label_is_preserved() {
        let t = NodeType::parse("IMAGE_TO_TEXT");
        assert_eq!(t, NodeType::Other("IMAGE_TO_TEXT".to_string()));
        assert!(!t.is_generator());
        assert!(!t.is_prompt_like());
    }

    #[test]
    fn test_type_classes_are_disjoint() {
        for t in NodeType::generators() {
            assert!(!t.is_prompt_like());
        }
        assert!(!NodeType::ContextMerger.is_generator());
        assert!(!NodeType::ContextMerger.is_prompt_like());
    }

    #[test]
    fn test_record_serializes_type_label() {
        let record = NodeRecord::new("a", NodeType::Prompt, serde_json::json!({"prompt": "hi"}));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "PROMPT");
        assert_eq!(value["id"], "a");
    }
}
