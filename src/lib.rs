//! approvalflow - template-driven approval workflow engine
//!
//! Tasks are instantiated from versioned workflow templates (graphs of
//! start, approval, condition and end nodes) and move through a fixed
//! lifecycle: submission, multi-party approval with per-node consensus,
//! rejection, cancellation, withdrawal, transfer, pause/resume, timeouts,
//! and rollback to an earlier node. Lifecycle events are handed to a
//! best-effort webhook notifier.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and the ports adapters implement
//! - **Service Layer** (`services`): the workflow engine and its pure helpers
//! - **Adapters** (`adapters`): SQLite persistence and webhook delivery
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use approvalflow::adapters::sqlite::{create_migrated_test_pool, SqliteTaskRepository, SqliteTemplateRepository};
//! use approvalflow::WorkflowEngine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = create_migrated_test_pool().await?;
//!     let engine = WorkflowEngine::new(
//!         Arc::new(SqliteTaskRepository::new(pool.clone())),
//!         Arc::new(SqliteTemplateRepository::new(pool)),
//!     );
//!     let task = engine.create("leave", "REQ-42", None).await?;
//!     engine.submit(task.id).await?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult, ErrorKind};
pub use domain::models::{
    Config, EventType, Node, NodeType, Record, RecordResult, Task, TaskState, Template,
    WorkflowEvent,
};
pub use domain::ports::{
    EventNotifier, NotifierError, NullNotifier, TaskFilter, TaskRepository, TemplateRepository,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::WorkflowEngine;
