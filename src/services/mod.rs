//! Engine services: the state machine, graph navigation, consensus, and the
//! workflow engine that ties them to the repositories.

pub mod consensus;
pub mod node_navigator;
pub mod state_machine;
pub mod task_locks;
pub mod workflow_engine;

pub use node_navigator::{find_next_node, find_start_node};
pub use state_machine::{can_transition, force_state, transition};
pub use task_locks::{TaskLockGuard, TaskLocks};
pub use workflow_engine::WorkflowEngine;
