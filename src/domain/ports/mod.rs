//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces that infrastructure adapters must implement:
//! - TaskRepository: task rows, state-history store, approver index
//! - TemplateRepository: versioned template storage
//! - EventNotifier: best-effort event delivery
//!
//! These traits keep the engine independent of specific storage and
//! transport implementations.

pub mod event_notifier;
pub mod task_repository;
pub mod template_repository;

pub use event_notifier::{EventNotifier, NotifierError, NullNotifier};
pub use task_repository::{TaskFilter, TaskRepository};
pub use template_repository::{TemplateRepository, LATEST_VERSION};
