use thiserror::Error;

use crate::domain::models::WorkflowEvent;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Notification queue is full, event {0} dropped")]
    QueueFull(uuid::Uuid),
    #[error("Notifier is shut down")]
    Closed,
}

/// Sink for task events.
///
/// `handle` must not block: implementations enqueue and return. Delivery is
/// best-effort and never feeds back into the workflow operation.
pub trait EventNotifier: Send + Sync {
    fn handle(&self, event: WorkflowEvent) -> Result<(), NotifierError>;
}

/// Notifier that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl EventNotifier for NullNotifier {
    fn handle(&self, _event: WorkflowEvent) -> Result<(), NotifierError> {
        Ok(())
    }
}
