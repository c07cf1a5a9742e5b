//! Task state machine.
//!
//! Every state change goes through [`transition`], which validates it against
//! the transition table and appends one entry to the task's state history.
//! Transitions are pure: the input task is left untouched and a new value is
//! returned.

use chrono::Utc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{StateChange, Task, TaskState};

/// Whether the table allows moving from `from` to `to`.
pub fn can_transition(from: TaskState, to: TaskState) -> bool {
    from.can_transition_to(to)
}

/// Validate and apply a transition, returning the updated task.
pub fn transition(task: &Task, to: TaskState, reason: &str) -> DomainResult<Task> {
    if !can_transition(task.state, to) {
        return Err(DomainError::InvalidStateTransition {
            from: task.state.to_string(),
            to: to.to_string(),
        });
    }
    Ok(apply(task, to, reason))
}

/// Set the state without consulting the table.
///
/// Only rollback out of a terminal state uses this; the change is still
/// written to the history so the trail stays complete.
pub fn force_state(task: &Task, to: TaskState, reason: &str) -> Task {
    tracing::warn!(
        task_id = %task.id,
        from = %task.state,
        to = %to,
        "Forcing state change outside the transition table"
    );
    apply(task, to, reason)
}

fn apply(task: &Task, to: TaskState, reason: &str) -> Task {
    let now = Utc::now();
    let mut next = task.clone();
    next.state_history.push(StateChange {
        from: task.state,
        to,
        reason: reason.to_string(),
        time: now,
    });
    next.state = to;
    next.updated_at = now;
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_task() -> Task {
        Task::new("leave", 1, "biz-1", None, "start")
    }

    #[test]
    fn test_legal_transition_appends_history() {
        let task = pending_task();
        let next = transition(&task, TaskState::Submitted, "submit").unwrap();

        assert_eq!(next.state, TaskState::Submitted);
        assert_eq!(next.state_history.len(), 1);
        let entry = &next.state_history[0];
        assert_eq!(entry.from, TaskState::Pending);
        assert_eq!(entry.to, TaskState::Submitted);
        assert_eq!(entry.reason, "submit");
        assert!(next.updated_at >= task.updated_at);

        // original value is not touched
        assert_eq!(task.state, TaskState::Pending);
        assert!(task.state_history.is_empty());
    }

    #[test]
    fn test_illegal_transition_fails() {
        let task = pending_task();
        let err = transition(&task, TaskState::Approved, "skip").unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        let mut task = pending_task();
        task.state = TaskState::Rejected;
        for to in TaskState::ALL {
            assert!(transition(&task, to, "x").is_err());
        }
    }

    #[test]
    fn test_force_state_bypasses_table() {
        let mut task = pending_task();
        task.state = TaskState::Approved;
        let next = force_state(&task, TaskState::Approving, "rollback");
        assert_eq!(next.state, TaskState::Approving);
        assert_eq!(next.state_history.len(), 1);
        assert_eq!(next.state_history[0].from, TaskState::Approved);
    }

    #[test]
    fn test_full_happy_path() {
        let task = pending_task();
        let task = transition(&task, TaskState::Submitted, "submit").unwrap();
        let task = transition(&task, TaskState::Approving, "first decision").unwrap();
        let task = transition(&task, TaskState::Approved, "consensus").unwrap();
        assert!(task.is_terminal());
        assert_eq!(task.state_history.len(), 3);
    }
}
