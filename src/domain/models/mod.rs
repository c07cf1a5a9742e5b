//! Domain models: templates, tasks, events, and configuration.

pub mod config;
pub mod event;
pub mod task;
pub mod template;

pub use config::{Config, DatabaseConfig, EngineConfig, LoggingConfig, NotifierConfig};
pub use event::{EventType, NodeInfo, WorkflowEvent};
pub use task::{Approval, Decision, Record, RecordResult, StateChange, Task, TaskState};
pub use template::{
    Edge, Node, NodeConfig, NodePermissions, NodeType, NotificationConfig, Template,
    WebhookEndpoint,
};
