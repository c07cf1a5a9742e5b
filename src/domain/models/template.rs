//! Workflow template domain model.
//!
//! A `Template` is an immutable, versioned graph of nodes and edges that
//! describes how an approval task travels from its Start node to completion.
//! Updating a template always produces a new version; existing versions are
//! never rewritten.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::EventType;

/// Kind of step a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    Approval,
    Condition,
    End,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Approval => "approval",
            Self::Condition => "condition",
            Self::End => "end",
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an approval node lets operators do with its approver list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodePermissions {
    pub allow_transfer: bool,
    pub allow_add_approver: bool,
    pub allow_remove_approver: bool,
}

impl Default for NodePermissions {
    fn default() -> Self {
        Self {
            allow_transfer: true,
            allow_add_approver: true,
            allow_remove_approver: true,
        }
    }
}

/// Type-specific node settings. A node without configuration has no
/// requirements, no timeout, and default (permissive) permissions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub require_comment: bool,
    pub require_attachments: bool,
    /// Approval deadline in seconds, measured from submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<NodePermissions>,
    /// Approvers assigned when the flow first enters this node.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub approvers: Vec<String>,
}

/// A step in the template graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Display hint only; traversal follows edges.
    #[serde(default)]
    pub order: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<NodeConfig>,
}

impl Node {
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            order: 0,
            config: None,
        }
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn require_comment(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.require_comment)
    }

    pub fn require_attachments(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.require_attachments)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.config
            .as_ref()
            .and_then(|c| c.timeout_secs)
            .map(Duration::from_secs)
    }

    pub fn permissions(&self) -> NodePermissions {
        self.config
            .as_ref()
            .and_then(|c| c.permissions)
            .unwrap_or_default()
    }

    pub fn default_approvers(&self) -> &[String] {
        self.config.as_ref().map_or(&[], |c| c.approvers.as_slice())
    }
}

/// A directed link between two nodes. `condition` is stored with the
/// template but never evaluated during traversal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub condition: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: String::new(),
        }
    }
}

/// A webhook target for task events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub url: String,
    /// Event types delivered to this endpoint; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<EventType>,
}

impl WebhookEndpoint {
    pub fn accepts(&self, event_type: EventType) -> bool {
        self.events.is_empty() || self.events.contains(&event_type)
    }
}

/// Notification settings carried by a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub webhooks: Vec<WebhookEndpoint>,
}

/// A versioned approval workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Assigned by the template store; 1 for the first version.
    #[serde(default)]
    pub version: i64,
    pub nodes: BTreeMap<String, Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationConfig>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            version: 0,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            notification: None,
            created_at: Utc::now(),
        }
    }

    /// Add a node, keyed by its id.
    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.insert(node.id.clone(), node);
        self
    }

    pub fn with_edge(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edges.push(Edge::new(from, to));
        self
    }

    pub fn with_webhook(mut self, endpoint: WebhookEndpoint) -> Self {
        self.notification
            .get_or_insert_with(NotificationConfig::default)
            .webhooks
            .push(endpoint);
        self
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn webhooks(&self) -> &[WebhookEndpoint] {
        self.notification.as_ref().map_or(&[], |n| n.webhooks.as_slice())
    }

    /// Check structural soundness before the template is stored.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Template id cannot be empty".to_string());
        }
        if self.nodes.is_empty() {
            return Err(format!("Template '{}' has no nodes", self.id));
        }
        for (key, node) in &self.nodes {
            if key != &node.id {
                return Err(format!(
                    "Node key '{}' does not match node id '{}'",
                    key, node.id
                ));
            }
        }
        let starts = self
            .nodes
            .values()
            .filter(|n| n.node_type == NodeType::Start)
            .count();
        if starts != 1 {
            return Err(format!(
                "Template '{}' must have exactly one start node, found {}",
                self.id, starts
            ));
        }
        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !self.nodes.contains_key(endpoint) {
                    return Err(format!(
                        "Edge {} -> {} references unknown node '{}'",
                        edge.from, edge.to, endpoint
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leave_template() -> Template {
        Template::new("leave", "Leave request")
            .with_node(Node::new("start", "Start", NodeType::Start))
            .with_node(Node::new("manager", "Manager", NodeType::Approval))
            .with_node(Node::new("end", "End", NodeType::End))
            .with_edge("start", "manager")
            .with_edge("manager", "end")
    }

    #[test]
    fn test_valid_template() {
        assert!(leave_template().validate().is_ok());
    }

    #[test]
    fn test_missing_start_node() {
        let template = Template::new("t", "T")
            .with_node(Node::new("a", "A", NodeType::Approval));
        let err = template.validate().unwrap_err();
        assert!(err.contains("exactly one start node"));
    }

    #[test]
    fn test_two_start_nodes() {
        let template = leave_template().with_node(Node::new("start2", "S2", NodeType::Start));
        assert!(template.validate().is_err());
    }

    #[test]
    fn test_edge_to_unknown_node() {
        let template = leave_template().with_edge("manager", "ghost");
        let err = template.validate().unwrap_err();
        assert!(err.contains("ghost"));
    }

    #[test]
    fn test_mismatched_node_key() {
        let mut template = leave_template();
        let node = Node::new("other", "Other", NodeType::Approval);
        template.nodes.insert("manager2".to_string(), node);
        assert!(template.validate().is_err());
    }

    #[test]
    fn test_unconfigured_node_is_permissive() {
        let node = Node::new("n", "N", NodeType::Approval);
        assert!(!node.require_comment());
        assert!(!node.require_attachments());
        assert!(node.timeout().is_none());
        let perms = node.permissions();
        assert!(perms.allow_transfer && perms.allow_add_approver && perms.allow_remove_approver);
        assert!(node.default_approvers().is_empty());
    }

    #[test]
    fn test_node_config_accessors() {
        let node = Node::new("n", "N", NodeType::Approval).with_config(NodeConfig {
            require_comment: true,
            timeout_secs: Some(3600),
            permissions: Some(NodePermissions {
                allow_transfer: false,
                ..Default::default()
            }),
            approvers: vec!["alice".to_string()],
            ..Default::default()
        });
        assert!(node.require_comment());
        assert!(!node.require_attachments());
        assert_eq!(node.timeout(), Some(Duration::from_secs(3600)));
        assert!(!node.permissions().allow_transfer);
        assert!(node.permissions().allow_add_approver);
        assert_eq!(node.default_approvers(), ["alice".to_string()]);
    }

    #[test]
    fn test_yaml_definition() {
        let yaml = r"
id: expense
name: Expense claim
nodes:
  start:
    id: start
    name: Start
    type: start
  finance:
    id: finance
    name: Finance
    type: approval
    config:
      require_comment: true
      timeout_secs: 86400
edges:
  - from: start
    to: finance
    condition: amount > 100
notification:
  webhooks:
    - url: http://hooks.local/expense
      events: [approved, rejected]
";
        let template: Template = serde_yaml::from_str(yaml).expect("YAML should parse");
        assert!(template.validate().is_ok());
        assert_eq!(template.edges[0].condition, "amount > 100");
        assert!(template.node("finance").unwrap().require_comment());
        let hook = &template.webhooks()[0];
        assert!(hook.accepts(EventType::Approved));
        assert!(!hook.accepts(EventType::Created));
    }
}
