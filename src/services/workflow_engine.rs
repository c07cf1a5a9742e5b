//! Workflow engine: the task lifecycle orchestrator.
//!
//! Every public operation follows the same shape: take the per-task lock,
//! load the task, validate preconditions, compute a new task value, persist
//! it with an optimistic version check, then hand an event to the notifier.
//! A failed precondition returns before anything is written.
//!
//! Graph traversal never evaluates edge conditions. Condition nodes are
//! passed through when the flow moves forward, and reaching an End node (or
//! running out of edges) completes the flow with an empty current node.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    Decision, EventType, Node, NodeType, Record, RecordResult, StateChange, Task, TaskState,
    Template, WorkflowEvent,
};
use crate::domain::ports::{
    EventNotifier, NotifierError, TaskFilter, TaskRepository, TemplateRepository, LATEST_VERSION,
};
use crate::services::consensus;
use crate::services::node_navigator::{find_next_node, find_start_node};
use crate::services::state_machine::{self, can_transition};
use crate::services::task_locks::TaskLocks;

/// Where a forward walk through the graph stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Advance {
    /// The node has no outgoing edge.
    NoSuccessor,
    /// Stopped at a node that needs input.
    Parked(String),
    /// Walked into an End node or off the last edge.
    Finished,
}

/// The approval workflow engine.
pub struct WorkflowEngine<T: TaskRepository, P: TemplateRepository> {
    task_repo: Arc<T>,
    template_repo: Arc<P>,
    notifier: Option<Arc<dyn EventNotifier>>,
    locks: TaskLocks,
}

impl<T: TaskRepository, P: TemplateRepository> WorkflowEngine<T, P> {
    pub fn new(task_repo: Arc<T>, template_repo: Arc<P>) -> Self {
        Self {
            task_repo,
            template_repo,
            notifier: None,
            locks: TaskLocks::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn EventNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    async fn load_task(&self, task_id: Uuid) -> DomainResult<Task> {
        self.task_repo
            .get(task_id)
            .await?
            .ok_or(DomainError::TaskNotFound(task_id))
    }

    async fn load_template(&self, task: &Task) -> DomainResult<Template> {
        self.template_repo
            .get(&task.template_id, task.template_version)
            .await
    }

    /// Persist `after` over `before`, bumping the version and mirroring any
    /// new state-history entries.
    async fn save(&self, before: &Task, mut after: Task) -> DomainResult<Task> {
        after.version = before.version + 1;
        after.updated_at = Utc::now();
        let appended: &[StateChange] = after
            .state_history
            .get(before.state_history.len()..)
            .unwrap_or(&[]);
        self.task_repo
            .update(&after, before.version, appended)
            .await?;
        Ok(after)
    }

    fn notify(&self, event_type: EventType, task: &Task, node: Option<&Node>) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        match notifier.handle(WorkflowEvent::new(event_type, task, node)) {
            Ok(()) => {}
            // The notifier already warned about the dropped event.
            Err(e @ NotifierError::QueueFull(_)) => tracing::debug!(
                task_id = %task.id,
                event = %event_type,
                error = %e,
                "Event notification dropped"
            ),
            Err(e) => tracing::warn!(
                task_id = %task.id,
                event = %event_type,
                error = %e,
                "Event notification not accepted"
            ),
        }
    }

    /// Look up an Approval node, failing for missing or non-approval nodes.
    fn approval_node<'a>(template: &'a Template, node_id: &str) -> DomainResult<&'a Node> {
        let node = template
            .node(node_id)
            .ok_or_else(|| DomainError::NodeNotFound(node_id.to_string()))?;
        if node.node_type != NodeType::Approval {
            return Err(DomainError::ValidationFailed(format!(
                "Node '{}' is a {} node, not an approval node",
                node_id, node.node_type
            )));
        }
        Ok(node)
    }

    fn ensure_not_terminal(task: &Task) -> DomainResult<()> {
        if task.is_terminal() {
            return Err(DomainError::InvalidState(format!(
                "Task {} is {} and can no longer change",
                task.id, task.state
            )));
        }
        Ok(())
    }

    /// Seed a node's approver list from its configuration the first time
    /// the flow reaches it.
    fn seed_approvers(task: &mut Task, node: &Node) {
        if node.node_type != NodeType::Approval || task.approvers.contains_key(&node.id) {
            return;
        }
        let defaults = node.default_approvers();
        if !defaults.is_empty() {
            task.approvers.insert(node.id.clone(), defaults.to_vec());
        }
    }

    /// Walk forward from `from`, passing through Condition nodes and
    /// completing an End node if one is reached.
    fn advance(template: &Template, task: &mut Task, from: &str) -> DomainResult<Advance> {
        let mut cursor = from.to_string();
        let mut visited: HashSet<String> = HashSet::from([cursor.clone()]);
        loop {
            let Some(next_id) = find_next_node(template, &cursor) else {
                return Ok(if cursor == from {
                    Advance::NoSuccessor
                } else {
                    Advance::Finished
                });
            };
            if !visited.insert(next_id.to_string()) {
                return Err(DomainError::ValidationFailed(format!(
                    "Template '{}' loops back to node '{}'",
                    template.id, next_id
                )));
            }
            let node = template
                .node(next_id)
                .ok_or_else(|| DomainError::NodeNotFound(next_id.to_string()))?;
            match node.node_type {
                NodeType::Condition => {
                    task.node_outputs
                        .insert(node.id.clone(), json!({ "result": "pass" }));
                    task.mark_completed(&node.id);
                    cursor = node.id.clone();
                }
                NodeType::End => {
                    task.node_outputs
                        .insert(node.id.clone(), json!({ "result": "end" }));
                    task.mark_completed(&node.id);
                    return Ok(Advance::Finished);
                }
                NodeType::Approval | NodeType::Start => {
                    Self::seed_approvers(task, node);
                    return Ok(Advance::Parked(node.id.clone()));
                }
            }
        }
    }

    // ========================================================================
    // Public API
    // ========================================================================

    /// Start a new task on the latest version of a template.
    pub async fn create(
        &self,
        template_id: &str,
        business_id: &str,
        params: Option<serde_json::Value>,
    ) -> DomainResult<Task> {
        let template = self.template_repo.get(template_id, LATEST_VERSION).await?;
        let start = find_start_node(&template).ok_or_else(|| {
            DomainError::NodeNotFound(format!("start node of template '{}'", template.id))
        })?;

        let task = Task::new(&template.id, template.version, business_id, params, start);
        self.task_repo.insert(&task).await?;

        tracing::info!(
            task_id = %task.id,
            template_id = %task.template_id,
            template_version = task.template_version,
            business_id = %task.business_id,
            "Task created"
        );
        self.notify(EventType::Created, &task, template.node(start));
        Ok(task)
    }

    /// Fetch a task by id.
    pub async fn get(&self, task_id: Uuid) -> DomainResult<Task> {
        self.load_task(task_id).await
    }

    /// Put a pending task in front of approvers, leaving the Start node.
    pub async fn submit(&self, task_id: Uuid) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;
        if task.state == TaskState::Paused {
            return Err(DomainError::InvalidState(format!(
                "Task {task_id} is paused; resume it before submitting"
            )));
        }
        if !can_transition(task.state, TaskState::Submitted) {
            return Err(DomainError::InvalidStateTransition {
                from: task.state.to_string(),
                to: TaskState::Submitted.to_string(),
            });
        }
        let template = self.load_template(&task).await?;

        let mut next = state_machine::transition(&task, TaskState::Submitted, "submitted")?;
        next.submitted_at = Some(Utc::now());

        let start = find_start_node(&template).map(str::to_string);
        if start.as_deref() == Some(next.current_node.as_str()) {
            let start_id = next.current_node.clone();
            let output = next.params.clone().unwrap_or_else(|| json!({}));
            next.node_outputs.insert(start_id.clone(), output);
            next.mark_completed(&start_id);

            match Self::advance(&template, &mut next, &start_id)? {
                Advance::NoSuccessor => {}
                Advance::Parked(node_id) => next.current_node = node_id,
                Advance::Finished => {
                    next.current_node = String::new();
                    next = state_machine::transition(
                        &next,
                        TaskState::Approved,
                        "no approval nodes",
                    )?;
                }
            }
        }

        let saved = self.save(&task, next).await?;
        tracing::info!(
            task_id = %saved.id,
            state = %saved.state,
            current_node = %saved.current_node,
            "Task submitted"
        );
        self.notify(
            EventType::Submitted,
            &saved,
            template.node(&saved.current_node),
        );
        if saved.state == TaskState::Approved {
            self.notify(EventType::Approved, &saved, None);
        }
        Ok(saved)
    }

    /// Record an approval on the current node and advance on consensus.
    pub async fn approve(
        &self,
        task_id: Uuid,
        node_id: &str,
        approver: &str,
        comment: &str,
        attachments: Option<Vec<String>>,
    ) -> DomainResult<Task> {
        self.decide(task_id, node_id, approver, comment, attachments, Decision::Approve)
            .await
    }

    /// Record a rejection; one rejection ends the flow.
    pub async fn reject(
        &self,
        task_id: Uuid,
        node_id: &str,
        approver: &str,
        comment: &str,
        attachments: Option<Vec<String>>,
    ) -> DomainResult<Task> {
        self.decide(task_id, node_id, approver, comment, attachments, Decision::Reject)
            .await
    }

    async fn decide(
        &self,
        task_id: Uuid,
        node_id: &str,
        approver: &str,
        comment: &str,
        attachments: Option<Vec<String>>,
        decision: Decision,
    ) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;
        if !task.state.is_in_review() {
            return Err(DomainError::InvalidState(format!(
                "Task {} is {}; decisions need a submitted or approving task",
                task_id, task.state
            )));
        }
        let template = self.load_template(&task).await?;
        let node = Self::approval_node(&template, node_id)?;
        if task.current_node != node_id {
            return Err(DomainError::InvalidState(format!(
                "Node '{}' is not the current node ('{}')",
                node_id, task.current_node
            )));
        }
        if node.require_comment() && comment.trim().is_empty() {
            return Err(DomainError::ValidationFailed(format!(
                "Node '{node_id}' requires a comment"
            )));
        }
        if node.require_attachments() && !attachments.as_ref().is_some_and(|a| !a.is_empty()) {
            return Err(DomainError::ValidationFailed(format!(
                "Node '{node_id}' requires attachments"
            )));
        }

        let mut next = task.clone();
        let now = Utc::now();
        next.record_decision(node_id, approver, decision, comment, now);
        next.records.push(
            Record::new(node_id, approver, decision.into(), comment).with_attachments(attachments),
        );

        let mut events = Vec::new();
        match decision {
            Decision::Reject => {
                next = state_machine::transition(
                    &next,
                    TaskState::Rejected,
                    &format!("rejected by {approver} at {node_id}"),
                )?;
                next.mark_completed(node_id);
                next.node_outputs
                    .insert(node_id.to_string(), json!({ "result": "reject" }));
                events.push(EventType::Rejected);
            }
            Decision::Approve => {
                if next.state == TaskState::Submitted {
                    next = state_machine::transition(
                        &next,
                        TaskState::Approving,
                        "first decision recorded",
                    )?;
                }
                if consensus::is_satisfied(&next, node_id, approver) {
                    next.mark_completed(node_id);
                    next.node_outputs
                        .insert(node_id.to_string(), json!({ "result": "approve" }));
                    match Self::advance(&template, &mut next, node_id)? {
                        Advance::Parked(following) => {
                            next.current_node = following;
                            events.push(EventType::NodeAdvanced);
                        }
                        Advance::NoSuccessor | Advance::Finished => {
                            next.current_node = String::new();
                            next = state_machine::transition(
                                &next,
                                TaskState::Approved,
                                &format!("consensus reached at {node_id}"),
                            )?;
                            events.push(EventType::Approved);
                        }
                    }
                }
            }
        }

        let saved = self.save(&task, next).await?;
        tracing::info!(
            task_id = %saved.id,
            node_id = %node_id,
            approver = %approver,
            decision = decision.as_str(),
            state = %saved.state,
            current_node = %saved.current_node,
            "Decision recorded"
        );
        for event_type in events {
            let event_node = match event_type {
                EventType::NodeAdvanced => template.node(&saved.current_node),
                _ => Some(node),
            };
            self.notify(event_type, &saved, event_node);
        }
        Ok(saved)
    }

    /// Cancel the task if its state allows it.
    pub async fn cancel(&self, task_id: Uuid, reason: &str) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;

        let mut next = state_machine::transition(&task, TaskState::Cancelled, reason)?;
        next.paused_at = None;
        next.paused_state = None;

        let saved = self.save(&task, next).await?;
        tracing::info!(task_id = %saved.id, reason = %reason, "Task cancelled");
        self.notify(EventType::Cancelled, &saved, None);
        Ok(saved)
    }

    /// Pull a submitted task back to pending before anyone has decided.
    pub async fn withdraw(&self, task_id: Uuid, reason: &str) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;
        if !task.state.is_in_review() {
            return Err(DomainError::InvalidState(format!(
                "Task {} is {}; only submitted or approving tasks can be withdrawn",
                task_id, task.state
            )));
        }
        let decisions = task.decision_record_count();
        if decisions > 0 {
            return Err(DomainError::ValidationFailed(format!(
                "Task {task_id} already has {decisions} decision(s) and cannot be withdrawn"
            )));
        }

        let mut next = state_machine::transition(&task, TaskState::Pending, reason)?;
        next.submitted_at = None;

        let saved = self.save(&task, next).await?;
        tracing::info!(task_id = %saved.id, reason = %reason, "Task withdrawn");
        self.notify(EventType::Withdrawn, &saved, None);
        Ok(saved)
    }

    /// Hand an assignment from one approver to another.
    pub async fn transfer(
        &self,
        task_id: Uuid,
        node_id: &str,
        from: &str,
        to: &str,
        reason: &str,
    ) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;
        Self::ensure_not_terminal(&task)?;
        let template = self.load_template(&task).await?;
        let node = Self::approval_node(&template, node_id)?;
        if !node.permissions().allow_transfer {
            return Err(DomainError::ValidationFailed(format!(
                "Node '{node_id}' does not allow transfer"
            )));
        }
        if !task.is_approver(node_id, from) {
            return Err(DomainError::ValidationFailed(format!(
                "'{from}' is not an approver of node '{node_id}'"
            )));
        }

        // An existing decision by `from` stays recorded.
        let mut next = task.clone();
        next.unassign_approver(node_id, from);
        next.assign_approver(node_id, to);
        next.records.push(Record::new(
            node_id,
            from,
            RecordResult::Transfer,
            format!("transferred to {to}: {reason}"),
        ));

        let saved = self.save(&task, next).await?;
        tracing::info!(task_id = %saved.id, node_id = %node_id, from = %from, to = %to, "Approval transferred");
        self.notify(EventType::ApproverChanged, &saved, Some(node));
        Ok(saved)
    }

    /// Assign an additional approver to a node.
    pub async fn add_approver(
        &self,
        task_id: Uuid,
        node_id: &str,
        approver: &str,
        reason: &str,
    ) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;
        Self::ensure_not_terminal(&task)?;
        let template = self.load_template(&task).await?;
        let node = Self::approval_node(&template, node_id)?;
        if !node.permissions().allow_add_approver {
            return Err(DomainError::ValidationFailed(format!(
                "Node '{node_id}' does not allow adding approvers"
            )));
        }
        if task.is_approver(node_id, approver) {
            return Err(DomainError::ValidationFailed(format!(
                "'{approver}' is already an approver of node '{node_id}'"
            )));
        }

        let mut next = task.clone();
        next.assign_approver(node_id, approver);
        next.records
            .push(Record::new(node_id, approver, RecordResult::AddApprover, reason));

        let saved = self.save(&task, next).await?;
        tracing::info!(task_id = %saved.id, node_id = %node_id, approver = %approver, "Approver added");
        self.notify(EventType::ApproverChanged, &saved, Some(node));
        Ok(saved)
    }

    /// Remove an approver who has not decided yet.
    pub async fn remove_approver(
        &self,
        task_id: Uuid,
        node_id: &str,
        approver: &str,
        reason: &str,
    ) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;
        Self::ensure_not_terminal(&task)?;
        let template = self.load_template(&task).await?;
        let node = Self::approval_node(&template, node_id)?;
        if !node.permissions().allow_remove_approver {
            return Err(DomainError::ValidationFailed(format!(
                "Node '{node_id}' does not allow removing approvers"
            )));
        }
        if !task.is_approver(node_id, approver) {
            return Err(DomainError::ValidationFailed(format!(
                "'{approver}' is not an approver of node '{node_id}'"
            )));
        }
        if task.has_decision(node_id, approver) {
            return Err(DomainError::ValidationFailed(format!(
                "'{approver}' has already decided on node '{node_id}'"
            )));
        }

        let mut next = task.clone();
        next.unassign_approver(node_id, approver);
        next.records
            .push(Record::new(node_id, approver, RecordResult::RemoveApprover, reason));

        let saved = self.save(&task, next).await?;
        tracing::info!(task_id = %saved.id, node_id = %node_id, approver = %approver, "Approver removed");
        self.notify(EventType::ApproverChanged, &saved, Some(node));
        Ok(saved)
    }

    /// Swap an undecided approver on an activated node for someone else.
    pub async fn replace_approver(
        &self,
        task_id: Uuid,
        node_id: &str,
        old: &str,
        new: &str,
        reason: &str,
    ) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;
        Self::ensure_not_terminal(&task)?;
        let template = self.load_template(&task).await?;
        let node = Self::approval_node(&template, node_id)?;
        if !task.is_activated(node_id) {
            return Err(DomainError::ValidationFailed(format!(
                "Node '{node_id}' has not been reached yet"
            )));
        }
        if !task.is_approver(node_id, old) {
            return Err(DomainError::ValidationFailed(format!(
                "'{old}' is not an approver of node '{node_id}'"
            )));
        }
        if task.has_decision(node_id, old) {
            return Err(DomainError::ValidationFailed(format!(
                "'{old}' has already decided on node '{node_id}'"
            )));
        }

        let mut next = task.clone();
        let already_listed = next.is_approver(node_id, new);
        if let Some(list) = next.approvers.get_mut(node_id) {
            if already_listed {
                list.retain(|a| a != old);
            } else if let Some(slot) = list.iter_mut().find(|a| a.as_str() == old) {
                *slot = new.to_string();
            }
        }
        next.records.push(Record::new(
            node_id,
            old,
            RecordResult::Replace,
            format!("replaced by {new}: {reason}"),
        ));

        let saved = self.save(&task, next).await?;
        tracing::info!(task_id = %saved.id, node_id = %node_id, old = %old, new = %new, "Approver replaced");
        self.notify(EventType::ApproverChanged, &saved, Some(node));
        Ok(saved)
    }

    /// Suspend the task, remembering the state to return to.
    pub async fn pause(&self, task_id: Uuid, reason: &str) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;

        let mut next = state_machine::transition(&task, TaskState::Paused, reason)?;
        next.paused_state = Some(task.state);
        next.paused_at = Some(Utc::now());

        let saved = self.save(&task, next).await?;
        tracing::info!(task_id = %saved.id, resume_to = %task.state, "Task paused");
        self.notify(EventType::Paused, &saved, None);
        Ok(saved)
    }

    /// Return a paused task to the state it was paused from.
    pub async fn resume(&self, task_id: Uuid, reason: &str) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;
        if task.state != TaskState::Paused {
            return Err(DomainError::InvalidState(format!(
                "Task {} is {}, not paused",
                task_id, task.state
            )));
        }

        let target = task.paused_state.unwrap_or(TaskState::Pending);
        let mut next = state_machine::transition(&task, target, reason)?;
        next.paused_at = None;
        next.paused_state = None;

        let saved = self.save(&task, next).await?;
        tracing::info!(task_id = %saved.id, state = %saved.state, "Task resumed");
        self.notify(EventType::Resumed, &saved, None);
        Ok(saved)
    }

    /// Time the task out if its current approval node's deadline has passed.
    ///
    /// Returns the task unchanged when no timeout applies.
    pub async fn handle_timeout(&self, task_id: Uuid) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;
        if !task.state.is_in_review() {
            return Ok(task);
        }
        let template = self.load_template(&task).await?;
        let Some(node) = template
            .node(&task.current_node)
            .filter(|n| n.node_type == NodeType::Approval)
        else {
            return Ok(task);
        };
        let Some(timeout) = node.timeout() else {
            return Ok(task);
        };
        let started = task.submitted_at.unwrap_or(task.created_at);
        let Some(deadline) = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|t| started.checked_add_signed(t))
        else {
            tracing::debug!(
                task_id = %task.id,
                node_id = %node.id,
                timeout_secs = timeout.as_secs(),
                "Deadline out of range, node never times out"
            );
            return Ok(task);
        };
        if Utc::now() <= deadline {
            tracing::debug!(task_id = %task.id, deadline = %deadline, "Deadline not reached");
            return Ok(task);
        }

        let next = state_machine::transition(
            &task,
            TaskState::Timeout,
            &format!("node '{}' deadline {} elapsed", node.id, deadline.to_rfc3339()),
        )?;
        let saved = self.save(&task, next).await?;
        tracing::info!(task_id = %saved.id, node_id = %node.id, "Task timed out");
        self.notify(EventType::Timeout, &saved, Some(node));
        Ok(saved)
    }

    /// Run `handle_timeout` over every task under review, returning the ids
    /// that timed out. Per-task failures are logged and skipped.
    pub async fn sweep_timeouts(&self) -> DomainResult<Vec<Uuid>> {
        let candidates = self
            .task_repo
            .query(TaskFilter::default().with_states([TaskState::Submitted, TaskState::Approving]))
            .await?;

        let mut timed_out = Vec::new();
        for candidate in candidates {
            match self.handle_timeout(candidate.id).await {
                Ok(task) if task.state == TaskState::Timeout => timed_out.push(task.id),
                Ok(_) => {}
                Err(e) => tracing::warn!(task_id = %candidate.id, error = %e, "Timeout check failed"),
            }
        }
        Ok(timed_out)
    }

    /// Rewind the task to an already completed node, discarding everything
    /// recorded for nodes after it.
    ///
    /// Rolling back to a condition node walks forward again and parks on
    /// the next approval node, or approves the task if the flow ends there.
    pub async fn rollback_to_node(
        &self,
        task_id: Uuid,
        target: &str,
        reason: &str,
    ) -> DomainResult<Task> {
        let _guard = self.locks.acquire(task_id).await;
        let task = self.load_task(task_id).await?;
        let Some(position) = task.completed_nodes.iter().position(|n| n == target) else {
            return Err(DomainError::ValidationFailed(format!(
                "Node '{target}' has not been completed and cannot be rolled back to"
            )));
        };
        let template = self.load_template(&task).await?;
        let node = template
            .node(target)
            .ok_or_else(|| DomainError::NodeNotFound(target.to_string()))?;
        let mut new_state = match node.node_type {
            NodeType::Start => TaskState::Pending,
            NodeType::Approval | NodeType::Condition => TaskState::Approving,
            NodeType::End => {
                return Err(DomainError::ValidationFailed(format!(
                    "Cannot roll back to end node '{target}'"
                )));
            }
        };

        let mut next = task.clone();
        next.completed_nodes.truncate(position + 1);
        let retained: HashSet<String> = next.completed_nodes.iter().cloned().collect();
        next.node_outputs.retain(|k, _| retained.contains(k));
        next.approvers.retain(|k, _| retained.contains(k));
        next.approvals.retain(|k, _| retained.contains(k));
        next.current_node = target.to_string();
        next.paused_at = None;
        next.paused_state = None;
        if new_state == TaskState::Pending {
            next.submitted_at = None;
        }
        next.records
            .push(Record::new(target, "", RecordResult::Rollback, reason));

        // A condition node takes no input; re-run the flow from it so the
        // task lands on the next node that does.
        if node.node_type == NodeType::Condition {
            match Self::advance(&template, &mut next, target)? {
                Advance::Parked(following) => next.current_node = following,
                Advance::NoSuccessor | Advance::Finished => {
                    next.current_node = String::new();
                    new_state = TaskState::Approved;
                }
            }
        }

        let reason = format!("rollback to {target}: {reason}");
        let next = if task.is_terminal() {
            state_machine::force_state(&next, new_state, &reason)
        } else {
            state_machine::transition(&next, new_state, &reason)?
        };

        let saved = self.save(&task, next).await?;
        tracing::info!(
            task_id = %saved.id,
            target = %target,
            state = %saved.state,
            completed = saved.completed_nodes.len(),
            "Task rolled back"
        );
        self.notify(EventType::RolledBack, &saved, Some(node));
        if saved.state == TaskState::Approved {
            self.notify(EventType::Approved, &saved, None);
        }
        Ok(saved)
    }

    /// List tasks matching the filter.
    pub async fn query(&self, filter: TaskFilter) -> DomainResult<Vec<Task>> {
        self.task_repo.query(filter).await
    }

    /// State history as kept by the separate append-only store.
    pub async fn state_history(&self, task_id: Uuid) -> DomainResult<Vec<StateChange>> {
        // Surface NotFound for unknown ids rather than an empty trail.
        self.load_task(task_id).await?;
        self.task_repo.state_history(task_id).await
    }
}
