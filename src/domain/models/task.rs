//! Task domain model.
//!
//! A task is one business item travelling through a template. Besides its
//! lifecycle state it carries five collections that must stay consistent
//! with each other: assigned approvers, collected approvals, per-node
//! outputs, the completed-node history, and the audit records.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created or withdrawn, not yet in front of approvers
    Pending,
    /// Submitted, no decision recorded yet
    Submitted,
    /// At least one decision recorded on the current node
    Approving,
    /// Every approval node reached consensus
    Approved,
    /// An approver rejected
    Rejected,
    /// Cancelled by the initiator or an operator
    Cancelled,
    /// Approval deadline elapsed
    Timeout,
    /// Temporarily suspended; `paused_state` remembers where to return
    Paused,
}

impl Default for TaskState {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskState {
    pub const ALL: [TaskState; 8] = [
        Self::Pending,
        Self::Submitted,
        Self::Approving,
        Self::Approved,
        Self::Rejected,
        Self::Cancelled,
        Self::Timeout,
        Self::Paused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Approving => "approving",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
            Self::Paused => "paused",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "submitted" => Some(Self::Submitted),
            "approving" => Some(Self::Approving),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "timeout" | "timed_out" => Some(Self::Timeout),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }

    /// Terminal states have no outgoing transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Cancelled | Self::Timeout
        )
    }

    /// Submitted or approving: the task is in front of approvers.
    pub fn is_in_review(&self) -> bool {
        matches!(self, Self::Submitted | Self::Approving)
    }

    /// Valid transitions from this state.
    pub fn valid_transitions(&self) -> &'static [TaskState] {
        match self {
            Self::Pending => &[Self::Submitted, Self::Cancelled, Self::Paused],
            Self::Submitted => &[
                Self::Approving,
                Self::Approved,
                Self::Rejected,
                Self::Cancelled,
                Self::Pending,
                Self::Timeout,
                Self::Paused,
            ],
            // Approving -> Approving re-enters review after a rollback to an
            // earlier approval node.
            Self::Approving => &[
                Self::Approving,
                Self::Approved,
                Self::Rejected,
                Self::Cancelled,
                Self::Pending,
                Self::Timeout,
                Self::Paused,
            ],
            Self::Paused => &[
                Self::Pending,
                Self::Submitted,
                Self::Approving,
                Self::Cancelled,
            ],
            Self::Approved | Self::Rejected | Self::Cancelled | Self::Timeout => &[],
        }
    }

    pub fn can_transition_to(&self, new_state: Self) -> bool {
        self.valid_transitions().contains(&new_state)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An approver's decision on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

/// A recorded decision, keyed by node and approver on the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub result: Decision,
    pub comment: String,
    pub time: DateTime<Utc>,
}

/// What an audit record documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordResult {
    Approve,
    Reject,
    Transfer,
    AddApprover,
    RemoveApprover,
    Replace,
    Rollback,
}

impl RecordResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Transfer => "transfer",
            Self::AddApprover => "add_approver",
            Self::RemoveApprover => "remove_approver",
            Self::Replace => "replace",
            Self::Rollback => "rollback",
        }
    }

    /// Approve and reject records are decisions; the rest are bookkeeping.
    pub fn is_decision(&self) -> bool {
        matches!(self, Self::Approve | Self::Reject)
    }
}

impl From<Decision> for RecordResult {
    fn from(decision: Decision) -> Self {
        match decision {
            Decision::Approve => Self::Approve,
            Decision::Reject => Self::Reject,
        }
    }
}

/// Append-only audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    pub node_id: String,
    pub approver: String,
    pub result: RecordResult,
    pub comment: String,
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
    pub time: DateTime<Utc>,
}

impl Record {
    pub fn new(
        node_id: impl Into<String>,
        approver: impl Into<String>,
        result: RecordResult,
        comment: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id: node_id.into(),
            approver: approver.into(),
            result,
            comment: comment.into(),
            attachments: None,
            time: Utc::now(),
        }
    }

    pub fn with_attachments(mut self, attachments: Option<Vec<String>>) -> Self {
        self.attachments = attachments;
        self
    }
}

/// One entry of the state-transition trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: TaskState,
    pub to: TaskState,
    pub reason: String,
    pub time: DateTime<Utc>,
}

/// A business approval flowing through a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    pub template_id: String,
    /// Template version bound at creation
    pub template_version: i64,
    pub business_id: String,
    /// Opaque business payload
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    pub state: TaskState,
    /// Node the task is waiting on; empty once the flow has completed
    pub current_node: String,
    #[serde(default)]
    pub paused_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub paused_state: Option<TaskState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    /// node id -> output, one per completed node
    #[serde(default)]
    pub node_outputs: BTreeMap<String, serde_json::Value>,
    /// node id -> assigned approvers, in assignment order
    #[serde(default)]
    pub approvers: BTreeMap<String, Vec<String>>,
    /// node id -> approver -> decision
    #[serde(default)]
    pub approvals: BTreeMap<String, BTreeMap<String, Approval>>,
    #[serde(default)]
    pub completed_nodes: Vec<String>,
    #[serde(default)]
    pub records: Vec<Record>,
    #[serde(default)]
    pub state_history: Vec<StateChange>,
    /// Version for optimistic locking
    #[serde(default = "initial_version")]
    pub version: u64,
}

const fn initial_version() -> u64 {
    1
}

impl Task {
    /// Create a pending task positioned at `start_node`.
    pub fn new(
        template_id: impl Into<String>,
        template_version: i64,
        business_id: impl Into<String>,
        params: Option<serde_json::Value>,
        start_node: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            template_id: template_id.into(),
            template_version,
            business_id: business_id.into(),
            params,
            state: TaskState::Pending,
            current_node: start_node.into(),
            paused_at: None,
            paused_state: None,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            node_outputs: BTreeMap::new(),
            approvers: BTreeMap::new(),
            approvals: BTreeMap::new(),
            completed_nodes: Vec::new(),
            records: Vec::new(),
            state_history: Vec::new(),
            version: initial_version(),
        }
    }

    /// True once the flow has walked past its last node.
    pub fn is_flow_completed(&self) -> bool {
        self.current_node.is_empty()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_completed(&self, node_id: &str) -> bool {
        self.completed_nodes.iter().any(|n| n == node_id)
    }

    /// Append `node_id` to the completed list unless it is already there.
    pub fn mark_completed(&mut self, node_id: &str) {
        if !self.is_completed(node_id) {
            self.completed_nodes.push(node_id.to_string());
        }
    }

    /// A node is activated once the flow has reached it.
    pub fn is_activated(&self, node_id: &str) -> bool {
        self.current_node == node_id || self.is_completed(node_id)
    }

    pub fn approvers_for(&self, node_id: &str) -> &[String] {
        self.approvers.get(node_id).map_or(&[], Vec::as_slice)
    }

    pub fn is_approver(&self, node_id: &str, approver: &str) -> bool {
        self.approvers_for(node_id).iter().any(|a| a == approver)
    }

    /// Add `approver` to the node's list if absent.
    pub fn assign_approver(&mut self, node_id: &str, approver: &str) {
        let list = self.approvers.entry(node_id.to_string()).or_default();
        if !list.iter().any(|a| a == approver) {
            list.push(approver.to_string());
        }
    }

    /// Remove `approver` from the node's list, returning whether it was there.
    pub fn unassign_approver(&mut self, node_id: &str, approver: &str) -> bool {
        match self.approvers.get_mut(node_id) {
            Some(list) => {
                let before = list.len();
                list.retain(|a| a != approver);
                list.len() != before
            }
            None => false,
        }
    }

    pub fn decision(&self, node_id: &str, approver: &str) -> Option<&Approval> {
        self.approvals.get(node_id).and_then(|m| m.get(approver))
    }

    pub fn has_decision(&self, node_id: &str, approver: &str) -> bool {
        self.decision(node_id, approver).is_some()
    }

    pub fn record_decision(
        &mut self,
        node_id: &str,
        approver: &str,
        result: Decision,
        comment: &str,
        time: DateTime<Utc>,
    ) {
        self.approvals.entry(node_id.to_string()).or_default().insert(
            approver.to_string(),
            Approval {
                result,
                comment: comment.to_string(),
                time,
            },
        );
    }

    /// Number of approve/reject records in the audit trail.
    pub fn decision_record_count(&self) -> usize {
        self.records.iter().filter(|r| r.result.is_decision()).count()
    }

    /// Every approver assigned on any node, deduplicated.
    pub fn all_approvers(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (node, list) in &self.approvers {
            for approver in list {
                let pair = (node.clone(), approver.clone());
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
        }
        pairs
    }
}
