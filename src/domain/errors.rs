//! Domain errors for the approval workflow engine.

use thiserror::Error;
use uuid::Uuid;

/// Coarse error categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Task, template, or node missing.
    NotFound,
    /// Operation illegal for the task's current state.
    InvalidState,
    /// Input or precondition rejected before anything was persisted.
    ValidationFailed,
    /// Another writer changed the task between load and write.
    Conflict,
    /// Storage or serialization failure.
    Internal,
}

/// Domain-level errors that can occur in the engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("Template not found: {id} (version {version})")]
    TemplateNotFound { id: String, version: i64 },

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::TaskNotFound(_) | Self::TemplateNotFound { .. } | Self::NodeNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::InvalidState(_) | Self::InvalidStateTransition { .. } => ErrorKind::InvalidState,
            Self::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Self::ConcurrencyConflict { .. } => ErrorKind::Conflict,
            Self::DatabaseError(_) | Self::SerializationError(_) | Self::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
