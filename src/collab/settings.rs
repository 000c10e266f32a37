//! Route groups and per-graph generation flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{KernelError, KernelResult};
use crate::types::GraphId;

/// One selectable route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOption {
    /// Route id the model must answer with.
    pub id: String,
    /// What the route is for, shown to the model.
    pub description: String,
}

/// A named set of routes a ROUTING node chooses from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteGroup {
    /// Group id referenced by `routeGroupId`.
    pub id: String,
    /// Candidate routes.
    #[serde(default)]
    pub routes: Vec<RouteOption>,
}

/// Per-graph generation flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationConfig {
    /// Keep `<think>` segments in stored replies.
    pub include_thinking: bool,
    /// Re-read GITHUB files from the mirror instead of the saved snapshot.
    pub github_auto_pull: bool,
}

/// Source of route groups and generation flags.
pub trait SettingsProvider: Send + Sync {
    /// Look up a route group.
    fn route_group(&self, id: &str) -> Option<RouteGroup>;

    /// Generation flags for a graph.
    fn generation_config(&self, graph_id: &GraphId) -> GenerationConfig;
}

/// Settings held in memory, optionally loaded from a JSON file.
///
/// File shape:
///
/// ```json
/// {
///   "routeGroups": [{"id": "support", "routes": [{"id": "billing", "description": "..."}]}],
///   "generation": {"includeThinking": false, "githubAutoPull": false},
///   "graphs": {"graph-1": {"githubAutoPull": true}}
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StaticSettings {
    route_groups: Vec<RouteGroup>,
    generation: GenerationConfig,
    graphs: BTreeMap<GraphId, GenerationConfig>,
}

impl StaticSettings {
    /// Empty settings: no route groups, all flags off.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route group, replacing any group with the same id.
    pub fn with_route_group(mut self, group: RouteGroup) -> Self {
        self.route_groups.retain(|g| g.id != group.id);
        self.route_groups.push(group);
        self
    }

    /// Set the flags used for graphs without an override.
    pub fn with_default_generation(mut self, config: GenerationConfig) -> Self {
        self.generation = config;
        self
    }

    /// Override the flags for one graph.
    pub fn with_graph_generation(mut self, graph_id: GraphId, config: GenerationConfig) -> Self {
        self.graphs.insert(graph_id, config);
        self
    }

    /// Number of configured route groups.
    pub fn route_group_count(&self) -> usize {
        self.route_groups.len()
    }

    /// Load settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> KernelResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            KernelError::Config(format!("cannot read settings file {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            KernelError::Config(format!("invalid settings file {}: {}", path.display(), e))
        })
    }

    /// Load from `ROUTE_GROUPS_PATH` if set, otherwise empty settings.
    pub fn from_env() -> KernelResult<Self> {
        match std::env::var("ROUTE_GROUPS_PATH") {
            Ok(path) => Self::from_json_file(path),
            Err(_) => Ok(Self::default()),
        }
    }
}

impl SettingsProvider for StaticSettings {
    fn route_group(&self, id: &str) -> Option<RouteGroup> {
        self.route_groups.iter().find(|g| g.id == id).cloned()
    }

    fn generation_config(&self, graph_id: &GraphId) -> GenerationConfig {
        self.graphs.get(graph_id).copied().unwrap_or(self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_override_wins() {
        let settings = StaticSettings::new()
            .with_default_generation(GenerationConfig { include_thinking: true, github_auto_pull: false })
            .with_graph_generation("g2".into(), GenerationConfig { include_thinking: false, github_auto_pull: true });

        assert!(settings.generation_config(&"g1".into()).include_thinking);
        assert!(settings.generation_config(&"g2".into()).github_auto_pull);
        assert!(!settings.generation_config(&"g2".into()).include_thinking);
    }

    #[test]
    fn test_deserialize_file_shape() {
        let settings: StaticSettings = serde_json::from_value(serde_json::json!({
            "routeGroups": [{"id": "support", "routes": [{"id": "billing", "description": "Money"}]}],
            "graphs": {"g1": {"githubAutoPull": true}}
        }))
        .unwrap();

        let group = settings.route_group("support").unwrap();
        assert_eq!(group.routes.len(), 1);
        assert!(settings.route_group("sales").is_none());
        assert!(settings.generation_config(&"g1".into()).github_auto_pull);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = StaticSettings::from_json_file("/nonexistent/routes.json").unwrap_err();
        assert!(matches!(err, KernelError::Config(_)));
    }
}
