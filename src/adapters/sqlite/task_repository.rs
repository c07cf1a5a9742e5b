//! SQLite implementation of the TaskRepository.

use async_trait::async_trait;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{StateChange, Task, TaskState};
use crate::domain::ports::{TaskFilter, TaskRepository};

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn append_history(
        tx: &mut Transaction<'_, Sqlite>,
        task_id: Uuid,
        history: &[StateChange],
    ) -> DomainResult<()> {
        for change in history {
            sqlx::query(
                r#"INSERT INTO task_state_history (task_id, from_state, to_state, reason, changed_at)
                   VALUES (?, ?, ?, ?, ?)"#,
            )
            .bind(task_id.to_string())
            .bind(change.from.as_str())
            .bind(change.to.as_str())
            .bind(&change.reason)
            .bind(format_datetime(&change.time))
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn write_approver_index(
        tx: &mut Transaction<'_, Sqlite>,
        task: &Task,
    ) -> DomainResult<()> {
        sqlx::query("DELETE FROM task_approvers WHERE task_id = ?")
            .bind(task.id.to_string())
            .execute(&mut **tx)
            .await?;
        for (node_id, approver) in task.all_approvers() {
            sqlx::query(
                "INSERT OR IGNORE INTO task_approvers (task_id, node_id, approver) VALUES (?, ?, ?)",
            )
            .bind(task.id.to_string())
            .bind(&node_id)
            .bind(&approver)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn insert(&self, task: &Task) -> DomainResult<()> {
        let data = serde_json::to_string(task)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO tasks (id, template_id, template_version, business_id, state,
               current_node, version, data, created_at, updated_at, submitted_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&task.template_id)
        .bind(task.template_version)
        .bind(&task.business_id)
        .bind(task.state.as_str())
        .bind(&task.current_node)
        .bind(task.version as i64)
        .bind(&data)
        .bind(format_datetime(&task.created_at))
        .bind(format_datetime(&task.updated_at))
        .bind(task.submitted_at.as_ref().map(format_datetime))
        .execute(&mut *tx)
        .await?;

        Self::append_history(&mut tx, task.id, &task.state_history).await?;
        Self::write_approver_index(&mut tx, task).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT id, state, version, data FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Task::try_from).transpose()
    }

    async fn update(
        &self,
        task: &Task,
        expected_version: u64,
        new_history: &[StateChange],
    ) -> DomainResult<()> {
        let data = serde_json::to_string(task)?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE tasks SET state = ?, current_node = ?, version = ?, data = ?,
               updated_at = ?, submitted_at = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(task.state.as_str())
        .bind(&task.current_node)
        .bind(task.version as i64)
        .bind(&data)
        .bind(format_datetime(&task.updated_at))
        .bind(task.submitted_at.as_ref().map(format_datetime))
        .bind(task.id.to_string())
        .bind(expected_version as i64)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT version FROM tasks WHERE id = ?")
                .bind(task.id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                None => DomainError::TaskNotFound(task.id),
                Some((found,)) => {
                    tracing::warn!(
                        task_id = %task.id,
                        expected_version,
                        found_version = found,
                        "Stale task write rejected"
                    );
                    DomainError::ConcurrencyConflict {
                        entity: "task".to_string(),
                        id: task.id.to_string(),
                    }
                }
            });
        }

        Self::append_history(&mut tx, task.id, new_history).await?;
        Self::write_approver_index(&mut tx, task).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        let mut query = String::from("SELECT id, state, version, data FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if !filter.states.is_empty() {
            let placeholders = vec!["?"; filter.states.len()].join(", ");
            query.push_str(&format!(" AND state IN ({placeholders})"));
            bindings.extend(filter.states.iter().map(|s| s.as_str().to_string()));
        }
        if let Some(template_id) = &filter.template_id {
            query.push_str(" AND template_id = ?");
            bindings.push(template_id.clone());
        }
        if let Some(business_id) = &filter.business_id {
            query.push_str(" AND business_id = ?");
            bindings.push(business_id.clone());
        }
        if let Some(after) = &filter.created_after {
            query.push_str(" AND created_at >= ?");
            bindings.push(format_datetime(after));
        }
        if let Some(before) = &filter.created_before {
            query.push_str(" AND created_at <= ?");
            bindings.push(format_datetime(before));
        }
        if let Some(approver) = &filter.approver {
            query.push_str(" AND id IN (SELECT task_id FROM task_approvers WHERE approver = ?)");
            bindings.push(approver.clone());
        }

        query.push_str(" ORDER BY created_at DESC");
        match (filter.limit, filter.offset) {
            (Some(limit), Some(offset)) => query.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => query.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => query.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn state_history(&self, task_id: Uuid) -> DomainResult<Vec<StateChange>> {
        let rows: Vec<StateHistoryRow> = sqlx::query_as(
            r#"SELECT from_state, to_state, reason, changed_at FROM task_state_history
               WHERE task_id = ? ORDER BY id"#,
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StateChange::try_from).collect()
    }
}

/// The columns needed to rebuild a task; the rest exist for filtering.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    state: String,
    version: i64,
    data: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = DomainError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = parse_uuid(&row.id)?;
        let mut task: Task = serde_json::from_str(&row.data)?;
        if task.id != id {
            return Err(DomainError::SerializationError(format!(
                "Task row {} holds data for {}",
                id, task.id
            )));
        }
        // Indexed columns are authoritative for what the store filters on.
        task.state = TaskState::from_str(&row.state).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid state: {}", row.state))
        })?;
        task.version = u64::try_from(row.version)
            .map_err(|e| DomainError::SerializationError(e.to_string()))?;
        Ok(task)
    }
}

#[derive(sqlx::FromRow)]
struct StateHistoryRow {
    from_state: String,
    to_state: String,
    reason: String,
    changed_at: String,
}

impl TryFrom<StateHistoryRow> for StateChange {
    type Error = DomainError;

    fn try_from(row: StateHistoryRow) -> Result<Self, Self::Error> {
        let parse_state = |s: &str| {
            TaskState::from_str(s)
                .ok_or_else(|| DomainError::SerializationError(format!("Invalid state: {s}")))
        };
        Ok(StateChange {
            from: parse_state(&row.from_state)?,
            to: parse_state(&row.to_state)?,
            reason: row.reason,
            time: parse_datetime(&row.changed_at)?,
        })
    }
}
