//! Common test utilities for integration tests
//!
//! Provides shared fixtures, helpers, and test utilities used across
//! multiple integration test files.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use approvalflow::adapters::sqlite::{
    create_migrated_test_pool, SqliteTaskRepository, SqliteTemplateRepository,
};
use approvalflow::domain::models::{NodeConfig, NodePermissions};
use approvalflow::{
    EventNotifier, EventType, Node, NodeType, NotifierError, Template, TemplateRepository,
    WorkflowEngine, WorkflowEvent,
};

pub type Engine = WorkflowEngine<SqliteTaskRepository, SqliteTemplateRepository>;

/// Notifier that keeps every event it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<WorkflowEvent>>,
}

impl RecordingNotifier {
    pub fn event_types(&self) -> Vec<EventType> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type)
            .collect()
    }

    pub fn last(&self) -> Option<WorkflowEvent> {
        self.events.lock().unwrap().last().cloned()
    }
}

impl EventNotifier for RecordingNotifier {
    fn handle(&self, event: WorkflowEvent) -> Result<(), NotifierError> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

/// Engine over a fresh in-memory database holding `templates`.
pub async fn engine_with(templates: Vec<Template>) -> (Arc<Engine>, Arc<RecordingNotifier>) {
    let (engine, notifier, _) = engine_and_templates(templates).await;
    (engine, notifier)
}

pub async fn engine_and_templates(
    templates: Vec<Template>,
) -> (Arc<Engine>, Arc<RecordingNotifier>, Arc<SqliteTemplateRepository>) {
    let pool = create_migrated_test_pool().await.unwrap();
    let task_repo = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let template_repo = Arc::new(SqliteTemplateRepository::new(pool));
    for template in templates {
        template_repo.create(&template).await.unwrap();
    }
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = WorkflowEngine::new(task_repo, Arc::clone(&template_repo))
        .with_notifier(notifier.clone());
    (Arc::new(engine), notifier, template_repo)
}

pub fn approval_node(id: &str, approvers: &[&str]) -> Node {
    Node::new(id, id, NodeType::Approval).with_config(NodeConfig {
        approvers: approvers.iter().map(ToString::to_string).collect(),
        ..Default::default()
    })
}

/// Expense claim: start -> manager -> amount(condition) -> finance -> end.
///
/// `manager` has no preset approvers. `finance` needs both `fay` and `finn`,
/// requires a comment, and optionally carries a timeout.
pub fn expense_template(finance_timeout_secs: Option<u64>) -> Template {
    let mut finance = approval_node("finance", &["fay", "finn"]);
    if let Some(config) = finance.config.as_mut() {
        config.timeout_secs = finance_timeout_secs;
        config.require_comment = true;
    }
    Template::new("expense", "Expense claim")
        .with_node(Node::new("start", "Start", NodeType::Start))
        .with_node(approval_node("manager", &[]))
        .with_node(Node::new("amount", "Amount check", NodeType::Condition))
        .with_node(finance)
        .with_node(Node::new("end", "End", NodeType::End))
        .with_edge("start", "manager")
        .with_edge("manager", "amount")
        .with_edge("amount", "finance")
        .with_edge("finance", "end")
}

/// Single approval node whose approver list cannot be changed.
pub fn locked_template() -> Template {
    let mut node = approval_node("legal", &["lee"]);
    if let Some(config) = node.config.as_mut() {
        config.permissions = Some(NodePermissions {
            allow_transfer: false,
            allow_add_approver: false,
            allow_remove_approver: false,
        });
    }
    Template::new("contract", "Contract review")
        .with_node(Node::new("start", "Start", NodeType::Start))
        .with_node(node)
        .with_node(Node::new("end", "End", NodeType::End))
        .with_edge("start", "legal")
        .with_edge("legal", "end")
}
