//! Typed node payloads.
//!
//! Persisted `data` is free-form JSON whose shape depends on the node type.
//! [`NodeData::from_record`] is the boundary where it is validated into a
//! tagged union; everything downstream works on the typed variants.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::node::{NodeRecord, NodeType};
use crate::error::{KernelError, KernelResult};

/// Token usage reported for a model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    /// Prompt tokens.
    #[serde(default)]
    pub input_tokens: u64,
    /// Completion tokens.
    #[serde(default)]
    pub output_tokens: u64,
}

/// PROMPT payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptData {
    /// Prompt text.
    pub prompt: String,
}

/// A file attached to a FILE_PROMPT node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachedFile {
    /// Storage identifier.
    pub id: String,
    /// Original file name.
    pub name: String,
    /// MIME type.
    pub mime_type: String,
    /// Base64 encoded bytes, when the file content was persisted inline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl AttachedFile {
    /// Whether the file should be sent as an image block.
    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// FILE_PROMPT payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilePromptData {
    /// Attached files.
    pub files: Vec<AttachedFile>,
}

/// A repository file referenced by a GITHUB node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RepoFile {
    /// Path relative to the repository root.
    pub path: String,
    /// Content captured when the node was saved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

fn default_branch() -> String {
    "main".to_string()
}

/// GITHUB payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubData {
    /// Repository in `owner/name` form.
    #[serde(default)]
    pub repo: String,
    /// Branch name.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Selected files.
    #[serde(default)]
    pub files: Vec<RepoFile>,
}

impl Default for GithubData {
    fn default() -> Self {
        Self {
            repo: String::new(),
            branch: default_branch(),
            files: Vec::new(),
        }
    }
}

/// TEXT_TO_TEXT payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextToTextData {
    /// Model identifier.
    pub model: String,
    /// Stored model reply.
    pub reply: String,
    /// Token usage for the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// One model inside a PARALLELIZATION node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParallelModel {
    /// Entry identifier (unique within the node).
    pub id: String,
    /// Model identifier.
    pub model: String,
    /// This model's reply.
    pub reply: String,
    /// Token usage for the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Aggregator settings and result of a PARALLELIZATION node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregatorData {
    /// Aggregator model identifier.
    pub model: String,
    /// Aggregator instructions; the configured default applies when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Aggregated reply.
    pub reply: String,
    /// Token usage for the aggregation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// PARALLELIZATION payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParallelizationData {
    /// Parallel models and their replies.
    pub models: Vec<ParallelModel>,
    /// Aggregator configuration and reply.
    pub aggregator: AggregatorData,
}

impl ParallelizationData {
    /// Attach usage to the parallel model with the given entry id.
    ///
    /// Returns `false` (and logs a warning) when no such model exists; the
    /// miss only affects bookkeeping, never the conversation context.
    pub fn apply_usage(&mut self, model_id: &str, usage: Usage) -> bool {
        match self.models.iter_mut().find(|m| m.id == model_id) {
            Some(model) => {
                model.usage = Some(usage);
                true
            }
            None => {
                tracing::warn!(
                    model_id = model_id,
                    known_models = self.models.len(),
                    "Usage update for unknown parallel model ignored"
                );
                false
            }
        }
    }
}

/// ROUTING payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoutingData {
    /// Model identifier.
    pub model: String,
    /// Stored model reply.
    pub reply: String,
    /// Route group this node chooses from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_group_id: Option<String>,
    /// Route chosen by the last run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_route: Option<String>,
}

/// How a context merger combines its branches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Every message of every branch.
    #[default]
    Full,
    /// The last `last_n` messages of every branch.
    LastN,
    /// One (cached) summary per branch.
    Summary,
}

fn default_last_n() -> usize {
    1
}

/// CONTEXT_MERGER payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergerData {
    /// Merge strategy.
    #[serde(default)]
    pub mode: MergeMode,
    /// Messages kept per branch in `last_n` mode.
    #[serde(default = "default_last_n", alias = "last_n")]
    pub last_n: usize,
    /// Cached summaries keyed by branch head node id.
    #[serde(default, alias = "branch_summaries")]
    pub branch_summaries: BTreeMap<String, String>,
}

impl Default for MergerData {
    fn default() -> Self {
        Self {
            mode: MergeMode::Full,
            last_n: default_last_n(),
            branch_summaries: BTreeMap::new(),
        }
    }
}

/// Typed node payload, one variant per node type.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// PROMPT.
    Prompt(PromptData),
    /// FILE_PROMPT.
    FilePrompt(FilePromptData),
    /// GITHUB.
    Github(GithubData),
    /// TEXT_TO_TEXT.
    TextToText(TextToTextData),
    /// PARALLELIZATION.
    Parallelization(ParallelizationData),
    /// ROUTING.
    Routing(RoutingData),
    /// CONTEXT_MERGER.
    ContextMerger(MergerData),
    /// A type this crate does not interpret; raw payload kept.
    Unknown(serde_json::Value),
}

impl NodeData {
    /// Validate a persisted record into its typed payload.
    ///
    /// `data` must be a JSON object (or null, read as `{}`) for every known type.
    pub fn from_record(record: &NodeRecord) -> KernelResult<Self> {
        Ok(match record.node_type {
            NodeType::Prompt => Self::Prompt(decode(record)?),
            NodeType::FilePrompt => Self::FilePrompt(decode(record)?),
            NodeType::Github => Self::Github(decode(record)?),
            NodeType::TextToText => Self::TextToText(decode(record)?),
            NodeType::Parallelization => Self::Parallelization(decode(record)?),
            NodeType::Routing => Self::Routing(decode(record)?),
            NodeType::ContextMerger => {
                let data: MergerData = decode(record)?;
                if data.last_n == 0 {
                    return Err(KernelError::validation(format!(
                        "context merger {} has lastN = 0, must be at least 1",
                        record.id
                    )));
                }
                Self::ContextMerger(data)
            }
            NodeType::Other(_) => Self::Unknown(record.data.clone()),
        })
    }

    /// The stored reply a generator contributes as an assistant turn.
    ///
    /// PARALLELIZATION nodes answer with their aggregator reply.
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::TextToText(d) => Some(&d.reply),
            Self::Routing(d) => Some(&d.reply),
            Self::Parallelization(d) => Some(&d.aggregator.reply),
            _ => None,
        }
    }
}

fn decode<T: DeserializeOwned>(record: &NodeRecord) -> KernelResult<T> {
    let value = match &record.data {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        serde_json::Value::Object(_) => record.data.clone(),
        other => {
            return Err(KernelError::validation(format!(
                "data of {} node {} must be a mapping, got {}",
                record.node_type,
                record.id,
                json_kind(other)
            )))
        }
    };

    serde_json::from_value(value).map_err(|e| {
        KernelError::validation(format!(
            "malformed data for {} node {}: {}",
            record.node_type, record.id, e
        ))
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "list",
        serde_json::Value::Object(_) => "mapping",
    }
}
