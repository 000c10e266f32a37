//! Execution plan types and request parsing.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::node::{GraphId, NodeId, NodeType};
use crate::error::{KernelError, KernelResult};

/// Which part of the graph a plan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanDirection {
    /// The node and everything reachable forward from it.
    Downstream,
    /// The node and everything reachable backward from it.
    Upstream,
    /// Every node in the graph.
    All,
    /// Union of the downstream closures of several roots.
    Multiple,
}

impl PlanDirection {
    /// Parse a direction label.
    pub fn parse(label: &str) -> KernelResult<Self> {
        match label {
            "downstream" => Ok(Self::Downstream),
            "upstream" => Ok(Self::Upstream),
            "all" => Ok(Self::All),
            "multiple" => Ok(Self::Multiple),
            other => Err(KernelError::validation(format!(
                "invalid direction '{}', expected one of downstream, upstream, all, multiple",
                other
            ))),
        }
    }

    /// The label for this direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downstream => "downstream",
            Self::Upstream => "upstream",
            Self::All => "all",
            Self::Multiple => "multiple",
        }
    }
}

impl fmt::Display for PlanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Node argument of a plan request: a single id or a list of ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeSelector {
    /// A single node.
    One(NodeId),
    /// Several nodes.
    Many(Vec<NodeId>),
}

/// A validated plan request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanSelection {
    /// Downstream closure of one node.
    Downstream(NodeId),
    /// Upstream closure of one node.
    Upstream(NodeId),
    /// The whole graph.
    All,
    /// Downstream closures of several roots.
    Multiple(Vec<NodeId>),
}

impl PlanSelection {
    /// Validate a raw `(direction, node)` pair.
    ///
    /// `all` ignores the node argument. `multiple` requires a list; the
    /// single-node directions require a single id.
    pub fn parse(direction: &str, node: Option<&NodeSelector>) -> KernelResult<Self> {
        let direction = PlanDirection::parse(direction)?;
        match (direction, node) {
            (PlanDirection::All, _) => Ok(Self::All),
            (PlanDirection::Multiple, Some(NodeSelector::Many(ids))) => Ok(Self::Multiple(ids.clone())),
            (PlanDirection::Multiple, Some(NodeSelector::One(_))) => Err(KernelError::validation(
                "direction 'multiple' requires a list of node ids",
            )),
            (PlanDirection::Downstream, Some(NodeSelector::One(id))) => Ok(Self::Downstream(id.clone())),
            (PlanDirection::Upstream, Some(NodeSelector::One(id))) => Ok(Self::Upstream(id.clone())),
            (d @ (PlanDirection::Downstream | PlanDirection::Upstream), Some(NodeSelector::Many(_))) => {
                Err(KernelError::validation(format!(
                    "direction '{}' requires a single node id",
                    d
                )))
            }
            (d, None) => Err(KernelError::validation(format!(
                "direction '{}' requires a node argument",
                d
            ))),
        }
    }

    /// The direction of this selection.
    pub fn direction(&self) -> PlanDirection {
        match self {
            Self::Downstream(_) => PlanDirection::Downstream,
            Self::Upstream(_) => PlanDirection::Upstream,
            Self::All => PlanDirection::All,
            Self::Multiple(_) => PlanDirection::Multiple,
        }
    }
}

/// One executable step of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    /// Generator node to execute.
    pub node_id: NodeId,
    /// Its type.
    pub node_type: NodeType,
    /// Steps that must finish first, sorted by id.
    pub depends_on: Vec<NodeId>,
}

/// A dependency-ordered list of generator steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Graph the plan was built for.
    pub graph_id: GraphId,
    /// Direction the universe was built with.
    pub direction: PlanDirection,
    /// Steps in topological order, ties broken by node id.
    pub steps: Vec<ExecutionStep>,
    /// Fingerprint of `(graph_id, steps)`.
    pub plan_hash: String,
}

impl ExecutionPlan {
    /// Whether the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Look up a step by node id.
    pub fn step(&self, node_id: &NodeId) -> Option<&ExecutionStep> {
        self.steps.iter().find(|s| &s.node_id == node_id)
    }

    /// Steps with no dependencies.
    pub fn roots(&self) -> impl Iterator<Item = &ExecutionStep> {
        self.steps.iter().filter(|s| s.depends_on.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_direction() {
        let err = PlanSelection::parse("sideways", Some(&NodeSelector::One("a".into()))).unwrap_err();
        assert!(matches!(err, KernelError::Validation(_)));
    }

    #[test]
    fn test_multiple_requires_list() {
        let err = PlanSelection::parse("multiple", Some(&NodeSelector::One("a".into()))).unwrap_err();
        assert!(err.to_string().contains("requires a list"));

        let ok = PlanSelection::parse("multiple", Some(&NodeSelector::Many(vec!["a".into(), "b".into()]))).unwrap();
        assert_eq!(ok.direction(), PlanDirection::Multiple);
    }

    #[test]
    fn test_single_directions_reject_lists() {
        let err = PlanSelection::parse("upstream", Some(&NodeSelector::Many(vec!["a".into()]))).unwrap_err();
        assert!(matches!(err, KernelError::Validation(_)));
    }

    #[test]
    fn test_all_ignores_node() {
        assert_eq!(PlanSelection::parse("all", None).unwrap(), PlanSelection::All);
    }

    #[test]
    fn test_selector_deserializes_untagged() {
        let one: NodeSelector = serde_json::from_value(serde_json::json!("n1")).unwrap();
        assert_eq!(one, NodeSelector::One("n1".into()));
        let many: NodeSelector = serde_json::from_value(serde_json::json!(["n1", "n2"])).unwrap();
        assert_eq!(many, NodeSelector::Many(vec!["n1".into(), "n2".into()]));
    }
}
