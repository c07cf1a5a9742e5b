use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{StateChange, Task, TaskState};

/// Filters for querying tasks. Every field narrows the result; an empty
/// filter returns all tasks.
#[derive(Default, Debug, Clone)]
pub struct TaskFilter {
    /// Match any of these states
    pub states: Vec<TaskState>,
    pub template_id: Option<String>,
    pub business_id: Option<String>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
    /// Tasks where this identity is assigned on any node
    pub approver: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl TaskFilter {
    pub fn with_states(mut self, states: impl IntoIterator<Item = TaskState>) -> Self {
        self.states = states.into_iter().collect();
        self
    }

    pub fn with_approver(mut self, approver: impl Into<String>) -> Self {
        self.approver = Some(approver.into());
        self
    }
}

/// Repository port for task persistence.
///
/// The task is stored as one serialized blob next to indexed scalar columns.
/// State history is mirrored to a separate append-only store, and approver
/// assignments to an index; both are written together with the task row.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert a new task together with its history and approver index.
    async fn insert(&self, task: &Task) -> DomainResult<()>;

    /// Get a task by ID
    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>>;

    /// Write `task` if the stored row still carries `expected_version`,
    /// appending `new_history` to the history store in the same transaction.
    async fn update(
        &self,
        task: &Task,
        expected_version: u64,
        new_history: &[StateChange],
    ) -> DomainResult<()>;

    /// List tasks matching the filter, newest first.
    async fn query(&self, filter: TaskFilter) -> DomainResult<Vec<Task>>;

    /// State history as recorded in the append-only store, oldest first.
    async fn state_history(&self, task_id: Uuid) -> DomainResult<Vec<StateChange>>;
}
