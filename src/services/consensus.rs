//! Approval consensus for a node.
//!
//! Called after an approve decision has been recorded. Rejections never
//! reach this check; a single reject ends the flow on its own.

use crate::domain::models::{Decision, Task};

/// Whether `node_id` has collected the approvals it needs, given that
/// `approver` just approved it.
///
/// - no assigned approvers: satisfied by the first decision
/// - one assigned approver who is `approver`: satisfied
/// - otherwise: every assigned approver must have approved
pub fn is_satisfied(task: &Task, node_id: &str, approver: &str) -> bool {
    let assigned = task.approvers_for(node_id);
    match assigned {
        [] => true,
        [only] if only == approver => true,
        _ => assigned.iter().all(|a| {
            task.decision(node_id, a)
                .is_some_and(|d| d.result == Decision::Approve)
        }),
    }
}
