//! Collaborators consumed by the kernel.
//!
//! The kernel never talks to the outside world directly. Route groups and
//! per-graph flags come from a [`SettingsProvider`], summaries from a
//! [`ModelClient`], and live repository content from a [`RepositoryMirror`].

pub mod settings;
pub mod model;
pub mod mirror;

#[cfg(feature = "service")]
pub mod openai;

pub use settings::{SettingsProvider, StaticSettings, RouteGroup, RouteOption, GenerationConfig};
pub use model::{ModelClient, ModelError, GenerationParams};
pub use mirror::{RepositoryMirror, FsRepositoryMirror, MirrorError};

#[cfg(feature = "service")]
pub use openai::{OpenAiCompatClient, OpenAiConfig};
