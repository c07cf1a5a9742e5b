//! Property tests for the state machine and rollback.

mod common;

use std::collections::HashSet;

use approvalflow::services::{can_transition, transition};
use approvalflow::{Node, NodeType, Task, TaskState, Template};
use common::{approval_node, engine_with};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn any_state() -> impl Strategy<Value = TaskState> {
    prop::sample::select(TaskState::ALL.to_vec())
}

fn task_in(state: TaskState) -> Task {
    let mut task = Task::new("leave", 1, "biz", None, "start");
    task.state = state;
    task
}

/// start -> a0 [-> c0] -> ... -> a{n-1} [-> c{n-1}] -> end, where `gated[i]`
/// puts a condition node `c{i}` after approval `a{i}`. No preset approvers.
fn chain_template(gated: &[bool]) -> Template {
    let mut template = Template::new("chain", "Chain")
        .with_node(Node::new("start", "Start", NodeType::Start))
        .with_node(Node::new("end", "End", NodeType::End));
    let mut previous = "start".to_string();
    for (i, gate) in gated.iter().enumerate() {
        let id = format!("a{i}");
        template = template
            .with_node(approval_node(&id, &[]))
            .with_edge(previous.as_str(), id.as_str());
        previous = id;
        if *gate {
            let check = format!("c{i}");
            template = template
                .with_node(Node::new(check.as_str(), "Check", NodeType::Condition))
                .with_edge(previous.as_str(), check.as_str());
            previous = check;
        }
    }
    template.with_edge(previous.as_str(), "end")
}

proptest! {
    /// Property: `transition` succeeds exactly when the table allows it,
    /// and a successful transition appends one matching history entry.
    #[test]
    fn prop_transition_follows_table(from in any_state(), to in any_state()) {
        let task = task_in(from);
        match transition(&task, to, "prop") {
            Ok(next) => {
                prop_assert!(can_transition(from, to));
                prop_assert_eq!(next.state, to);
                prop_assert_eq!(next.state_history.len(), task.state_history.len() + 1);
                let last = next.state_history.last().unwrap();
                prop_assert_eq!((last.from, last.to), (from, to));
                prop_assert_eq!(task.state, from, "input task untouched");
            }
            Err(_) => prop_assert!(!can_transition(from, to)),
        }
    }

    /// Property: terminal states have no outgoing transition.
    #[test]
    fn prop_terminal_states_are_final(from in any_state(), to in any_state()) {
        if from.is_terminal() {
            prop_assert!(!can_transition(from, to));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Property: rolling back to any completed node keeps the completed
    /// prefix up to it, drops every per-node entry that is neither
    /// completed nor current, never shrinks the records, and lands where
    /// the target's type dictates. Condition targets walk forward again.
    #[test]
    fn prop_rollback_keeps_collections_consistent(
        gated in prop::collection::vec(any::<bool>(), 1..5),
        approved in 0usize..5,
        pick in any::<prop::sample::Index>(),
    ) {
        let n = gated.len();
        let approved = approved.min(n);
        tokio_test::block_on(async {
            let (engine, _) = engine_with(vec![chain_template(&gated)]).await;
            let task = engine.create("chain", "biz", None).await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            let mut task = engine.submit(task.id).await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            for i in 0..approved {
                task = engine.approve(task.id, &format!("a{i}"), "who", "", None).await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
            }
            prop_assert_eq!(task.state == TaskState::Approved, approved == n);

            let candidates: Vec<String> = task
                .completed_nodes
                .iter()
                .filter(|id| id.as_str() != "end")
                .cloned()
                .collect();
            let target = candidates[pick.index(candidates.len())].clone();
            let records_before = task.records.len();

            let rolled = engine.rollback_to_node(task.id, &target, "prop").await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;

            let position = task.completed_nodes.iter().position(|id| *id == target).unwrap();
            prop_assert_eq!(&rolled.completed_nodes[..=position], &task.completed_nodes[..=position]);
            prop_assert!(rolled.records.len() > records_before);

            let live: HashSet<&String> = rolled
                .completed_nodes
                .iter()
                .chain(std::iter::once(&rolled.current_node))
                .collect();
            prop_assert!(rolled.node_outputs.keys().all(|k| live.contains(k)));
            prop_assert!(rolled.approvals.keys().all(|k| live.contains(k)));
            prop_assert!(rolled.approvers.keys().all(|k| live.contains(k)));

            if let Some(i) = target.strip_prefix('c').and_then(|i| i.parse::<usize>().ok()) {
                if i + 1 == n {
                    prop_assert_eq!(rolled.state, TaskState::Approved);
                    prop_assert!(rolled.current_node.is_empty());
                } else {
                    let following = format!("a{}", i + 1);
                    prop_assert_eq!(rolled.state, TaskState::Approving);
                    prop_assert_eq!(&rolled.current_node, &following);
                    prop_assert_eq!(rolled.completed_nodes.len(), position + 1);
                }
            } else {
                let expected = if target == "start" { TaskState::Pending } else { TaskState::Approving };
                prop_assert_eq!(rolled.state, expected);
                prop_assert_eq!(&rolled.current_node, &target);
                prop_assert_eq!(rolled.completed_nodes.len(), position + 1);
            }

            let stored = engine.state_history(task.id).await
                .map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(stored, rolled.state_history);
            Ok(())
        })?;
    }
}
