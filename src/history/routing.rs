//! Routing prompt and response schema for ROUTING nodes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::MessageHistoryBuilder;
use crate::collab::RouteGroup;
use crate::error::{KernelError, KernelResult};
use crate::store::GraphStore;
use crate::types::{GraphId, Message, NodeData, NodeId, NodeType};

/// Accepts only route ids from one route group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSchema {
    /// Allowed route ids, in group order.
    pub route_ids: Vec<String>,
}

impl RouteSchema {
    /// Schema over a group's routes.
    pub fn for_group(group: &RouteGroup) -> Self {
        Self {
            route_ids: group.routes.iter().map(|r| r.id.clone()).collect(),
        }
    }

    /// JSON Schema for a structured-output request: `{"route": <id>}`.
    pub fn json_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "route": { "type": "string", "enum": self.route_ids }
            },
            "required": ["route"],
            "additionalProperties": false
        })
    }

    /// Validate a model response, returning the chosen route id.
    ///
    /// Accepts `{"route": "<id>"}` or a bare JSON string.
    pub fn validate(&self, response: &Value) -> KernelResult<String> {
        let route = match response {
            Value::String(s) => s.as_str(),
            Value::Object(map) => map
                .get("route")
                .and_then(Value::as_str)
                .ok_or_else(|| KernelError::validation("routing response has no string 'route' field"))?,
            _ => return Err(KernelError::validation("routing response must be an object or a string")),
        };

        if self.route_ids.iter().any(|id| id == route) {
            Ok(route.to_string())
        } else {
            Err(KernelError::validation(format!(
                "route '{}' is not one of: {}",
                route,
                self.route_ids.join(", ")
            )))
        }
    }

    /// Parse and validate a raw model reply.
    pub fn validate_str(&self, raw: &str) -> KernelResult<String> {
        let value: Value = serde_json::from_str(raw.trim())
            .map_err(|e| KernelError::validation(format!("routing response is not JSON: {}", e)))?;
        self.validate(&value)
    }
}

/// Everything needed to run a routing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPrompt {
    /// Route group the prompt was rendered from.
    pub route_group_id: String,
    /// Messages to send.
    pub messages: Vec<Message>,
    /// Response validator.
    pub schema: RouteSchema,
}

fn render_routing_template(query: &str, group: &RouteGroup) -> String {
    let routes = group
        .routes
        .iter()
        .map(|r| format!("- {}: {}", r.id, r.description))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a router. Read the user query and pick the one route best suited to handle it.\n\n\
         User query:\n{}\n\n\
         Available routes:\n{}\n\n\
         Respond with a JSON object {{\"route\": \"<route id>\"}} using exactly one of the route ids above.",
        query, routes
    )
}

impl<S: GraphStore + 'static> MessageHistoryBuilder<S> {
    /// Render the routing prompt of a ROUTING node.
    ///
    /// Fails with `Validation` if the node has no route group or the group
    /// is not configured (or has no routes), and with `NotFound` if no PROMPT
    /// ancestor exists to take the query from.
    pub async fn construct_routing_prompt(
        &self,
        graph_id: &GraphId,
        node_id: &NodeId,
    ) -> KernelResult<RoutingPrompt> {
        let record = self.fetch_record(graph_id, node_id).await?;
        let data = match NodeData::from_record(&record)? {
            NodeData::Routing(data) => data,
            _ => {
                return Err(KernelError::validation(format!(
                    "node {} is {}, not ROUTING",
                    node_id, record.node_type
                )))
            }
        };

        let group_id = data
            .route_group_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| KernelError::validation(format!("routing node {} has no routeGroupId", node_id)))?;
        let group = self
            .settings
            .route_group(&group_id)
            .ok_or_else(|| KernelError::validation(format!("route group '{}' is not configured", group_id)))?;
        if group.routes.is_empty() {
            return Err(KernelError::validation(format!("route group '{}' has no routes", group_id)));
        }

        let prompt_node = self
            .traversal
            .get_parent_node_of_type(graph_id, node_id, &[NodeType::Prompt])
            .await?
            .ok_or_else(|| KernelError::not_found("prompt ancestor", node_id))?;
        let query = match NodeData::from_record(&self.fetch_record(graph_id, &prompt_node.id).await?)? {
            NodeData::Prompt(p) => p.prompt,
            _ => String::new(),
        };

        tracing::debug!(
            graph_id = %graph_id,
            node_id = %node_id,
            route_group = %group_id,
            routes = group.routes.len(),
            "Routing prompt constructed"
        );

        Ok(RoutingPrompt {
            messages: vec![Message::user(render_routing_template(&query, &group))],
            schema: RouteSchema::for_group(&group),
            route_group_id: group_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::RouteOption;

    fn group() -> RouteGroup {
        RouteGroup {
            id: "support".into(),
            routes: vec![
                RouteOption { id: "billing".into(), description: "Invoices and payments".into() },
                RouteOption { id: "tech".into(), description: "Bugs and outages".into() },
            ],
        }
    }

    #[test]
    fn test_schema_accepts_known_route() {
        let schema = RouteSchema::for_group(&group());
        assert_eq!(schema.validate(&json!({"route": "tech"})).unwrap(), "tech");
        assert_eq!(schema.validate(&json!("billing")).unwrap(), "billing");
        assert_eq!(schema.validate_str(" {\"route\": \"billing\"} ").unwrap(), "billing");
    }

    #[test]
    fn test_schema_rejects_unknown_route() {
        let schema = RouteSchema::for_group(&group());
        assert!(matches!(schema.validate(&json!({"route": "sales"})), Err(KernelError::Validation(_))));
        assert!(schema.validate(&json!(42)).is_err());
        assert!(schema.validate_str("not json").is_err());
    }

    #[test]
    fn test_json_schema_lists_route_ids() {
        let schema = RouteSchema::for_group(&group()).json_schema();
        assert_eq!(schema["properties"]["route"]["enum"], json!(["billing", "tech"]));
    }

    #[test]
    fn test_template_embeds_query_and_routes() {
        let text = render_routing_template("My card was charged twice", &group());
        assert!(text.contains("My card was charged twice"));
        assert!(text.contains("- billing: Invoices and payments"));
        assert!(text.contains("- tech: Bugs and outages"));
    }
}
