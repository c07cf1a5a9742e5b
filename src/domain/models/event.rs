//! Events handed to the notifier when a task changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::Task;
use super::template::{Node, NodeType};

/// Kind of lifecycle change an event announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Submitted,
    NodeAdvanced,
    Approved,
    Rejected,
    Cancelled,
    Withdrawn,
    Timeout,
    Paused,
    Resumed,
    RolledBack,
    ApproverChanged,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Submitted => "submitted",
            Self::NodeAdvanced => "node_advanced",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Withdrawn => "withdrawn",
            Self::Timeout => "timeout",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::RolledBack => "rolled_back",
            Self::ApproverChanged => "approver_changed",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The node an event refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
}

impl From<&Node> for NodeInfo {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            name: node.name.clone(),
            node_type: node.node_type,
        }
    }
}

/// Notification payload: a snapshot of the task after the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub task: Task,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeInfo>,
}

impl WorkflowEvent {
    pub fn new(event_type: EventType, task: &Task, node: Option<&Node>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            task: task.clone(),
            node: node.map(NodeInfo::from),
        }
    }
}
