//! Core types for the context kernel.

pub mod node;
pub mod edge;
pub mod data;
pub mod message;
pub mod plan;

pub use node::{GraphId, NodeId, NodeType, NodeRef, NodeAtDistance, NodeRecord};
pub use edge::Edge;
pub use data::{
    NodeData, Usage, PromptData, AttachedFile, FilePromptData, RepoFile, GithubData,
    TextToTextData, ParallelModel, AggregatorData, ParallelizationData, RoutingData,
    MergeMode, MergerData,
};
pub use message::{Role, ContentBlock, Message, MessageMetadata, ParallelResult};
pub use plan::{
    PlanDirection, NodeSelector, PlanSelection, ExecutionStep, ExecutionPlan,
};
