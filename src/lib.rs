//! # context-kernel
//!
//! Deterministic context reconstruction for visual conversation graphs.
//!
//! A graph holds prompt-like nodes (PROMPT, FILE_PROMPT, GITHUB) that carry
//! user input and generator nodes (TEXT_TO_TEXT, PARALLELIZATION, ROUTING)
//! that carry model output. The kernel answers two questions about it:
//!
//! > In what order must the generators run?
//!
//! > What conversation does a model call at a given node see?
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─ ExecutionPlanBuilder ─→ ExecutionPlan (+ plan_hash)
//! GraphStore ─→ GraphTraversal
//!                    └─ MessageHistoryBuilder ─→ Vec<Message>
//!                              └─ ContextMergerEngine ─→ merged user turn
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Traversal visits neighbors in node-id order
//! - Equal distances break ties by node id
//! - Same graph state + same selection → identical `plan_hash`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod error;
pub mod config;
pub mod canonical;
pub mod collab;
pub mod store;
pub mod traversal;
pub mod plan;
pub mod history;
pub mod merger;
pub mod kernel;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    GraphId, NodeId, NodeType, NodeRef, NodeAtDistance, NodeRecord, Edge,
    NodeData, MergeMode, MergerData,
    Role, ContentBlock, Message, MessageMetadata, ParallelResult,
    PlanDirection, NodeSelector, PlanSelection, ExecutionStep, ExecutionPlan,
};
pub use error::{KernelError, KernelResult};
pub use config::KernelConfig;
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};
pub use collab::{
    SettingsProvider, StaticSettings, RouteGroup, RouteOption, GenerationConfig,
    ModelClient, ModelError, GenerationParams,
    RepositoryMirror, FsRepositoryMirror, MirrorError,
};
pub use store::{GraphStore, NodeRepository, NodeKey, InMemoryGraphStore};
#[cfg(feature = "postgres")]
pub use store::PostgresGraphStore;
pub use traversal::{GraphTraversal, WalkDirection, NearestChildren, oldest_first};
pub use plan::ExecutionPlanBuilder;
pub use history::{
    HistoryOptions, HistoryView, MessageHistoryBuilder, ThinkingPolicy,
    RouteSchema, RoutingPrompt,
};
pub use merger::ContextMergerEngine;
pub use kernel::ContextKernel;

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};

/// Schema version of plans and message metadata.
/// Increment on breaking changes to any serialized type.
pub const CONTEXT_KERNEL_SCHEMA_VERSION: &str = "1.0.0";
