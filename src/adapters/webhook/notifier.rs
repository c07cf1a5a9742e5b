//! Queue-backed webhook notifier.
//!
//! `handle` only enqueues. A fixed pool of workers drains the queue, looks up
//! the endpoints for the event's template, and delivers to each one.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use super::delivery::{deliver, DeliveryPolicy};
use crate::domain::models::{NotifierConfig, WebhookEndpoint, WorkflowEvent};
use crate::domain::ports::{EventNotifier, NotifierError, TemplateRepository};

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<WorkflowEvent>>>;

/// Resolves and delivers events for the workers.
struct Dispatcher<T: TemplateRepository> {
    client: Client,
    policy: DeliveryPolicy,
    templates: Arc<T>,
    default_webhooks: Vec<WebhookEndpoint>,
}

impl<T: TemplateRepository> Dispatcher<T> {
    async fn endpoints_for(&self, event: &WorkflowEvent) -> Vec<WebhookEndpoint> {
        let task = &event.task;
        let mut endpoints = match self
            .templates
            .get(&task.template_id, task.template_version)
            .await
        {
            Ok(template) => template.webhooks().to_vec(),
            Err(e) => {
                tracing::warn!(
                    template_id = %task.template_id,
                    version = task.template_version,
                    error = %e,
                    "Template lookup failed, using default webhooks only"
                );
                Vec::new()
            }
        };
        endpoints.extend(self.default_webhooks.iter().cloned());
        endpoints.retain(|e| e.accepts(event.event_type));
        endpoints
    }

    async fn dispatch(&self, event: &WorkflowEvent) {
        for endpoint in self.endpoints_for(event).await {
            match deliver(&self.client, &self.policy, &endpoint.url, event).await {
                Ok(attempts) => tracing::debug!(
                    url = %endpoint.url,
                    event = %event.event_type,
                    task_id = %event.task.id,
                    attempts,
                    "Webhook delivered"
                ),
                Err(e) => tracing::warn!(
                    url = %endpoint.url,
                    event = %event.event_type,
                    task_id = %event.task.id,
                    error = %e,
                    "Webhook delivery abandoned"
                ),
            }
        }
    }
}

/// Event notifier posting events to webhooks from a worker pool.
pub struct WebhookNotifier {
    sender: Mutex<Option<mpsc::Sender<WorkflowEvent>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl WebhookNotifier {
    /// Build the HTTP client and spawn `config.workers` workers.
    ///
    /// Must be called inside a tokio runtime.
    pub fn start<T>(config: &NotifierConfig, templates: Arc<T>) -> Result<Self>
    where
        T: TemplateRepository + 'static,
    {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build webhook HTTP client")?;

        let dispatcher = Arc::new(Dispatcher {
            client,
            policy: DeliveryPolicy::from(config),
            templates,
            default_webhooks: config.default_webhooks.clone(),
        });

        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let workers = (0..config.workers)
            .map(|worker| {
                let receiver = Arc::clone(&receiver);
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    loop {
                        // Hold the receiver lock only while waiting for the next event.
                        let next = receiver.lock().await.recv().await;
                        let Some(event) = next else { break };
                        dispatcher.dispatch(&event).await;
                    }
                    tracing::debug!(worker, "Webhook worker stopped");
                })
            })
            .collect();

        tracing::info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            default_webhooks = config.default_webhooks.len(),
            "Webhook notifier started"
        );

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: tokio::sync::Mutex::new(workers),
        })
    }

    /// Close the queue, let the workers drain it, and wait for them.
    pub async fn shutdown(&self) {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let workers = std::mem::take(&mut *self.workers.lock().await);
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Webhook worker panicked");
            }
        }
        tracing::info!("Webhook notifier stopped");
    }
}

impl EventNotifier for WebhookNotifier {
    fn handle(&self, event: WorkflowEvent) -> Result<(), NotifierError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(NotifierError::Closed);
        };
        match sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    event_id = %event.id,
                    event = %event.event_type,
                    task_id = %event.task.id,
                    "Notification queue full, dropping event"
                );
                Err(NotifierError::QueueFull(event.id))
            }
            Err(TrySendError::Closed(_)) => Err(NotifierError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteTemplateRepository};
    use crate::domain::models::{EventType, Node, NodeType, Task, Template};
    use mockito::Server;

    fn fast_config(default_webhooks: Vec<WebhookEndpoint>) -> NotifierConfig {
        NotifierConfig {
            workers: 2,
            queue_capacity: 16,
            max_attempts: 3,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
            request_timeout_secs: 5,
            default_webhooks,
        }
    }

    async fn templates_with(hooks: Vec<WebhookEndpoint>) -> Arc<SqliteTemplateRepository> {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteTemplateRepository::new(pool));
        let mut template = Template::new("leave", "Leave")
            .with_node(Node::new("start", "Start", NodeType::Start));
        for hook in hooks {
            template = template.with_webhook(hook);
        }
        repo.create(&template).await.unwrap();
        repo
    }

    fn event(event_type: EventType) -> WorkflowEvent {
        let task = Task::new("leave", 1, "biz-1", None, "start");
        WorkflowEvent::new(event_type, &task, None)
    }

    fn endpoint(url: String, events: Vec<EventType>) -> WebhookEndpoint {
        WebhookEndpoint { url, events }
    }

    #[tokio::test]
    async fn test_delivers_to_template_and_default_endpoints() {
        let mut server = Server::new_async().await;
        let template_hook = server
            .mock("POST", "/template")
            .match_header("content-type", "application/json")
            .match_header("x-approvalflow-event", "created")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let default_hook = server
            .mock("POST", "/default")
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let templates =
            templates_with(vec![endpoint(format!("{}/template", server.url()), vec![])]).await;
        let config = fast_config(vec![endpoint(format!("{}/default", server.url()), vec![])]);
        let notifier = WebhookNotifier::start(&config, templates).unwrap();

        notifier.handle(event(EventType::Created)).unwrap();
        notifier.shutdown().await;

        template_hook.assert_async().await;
        default_hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_event_type_filter() {
        let mut server = Server::new_async().await;
        let hook = server
            .mock("POST", "/approved-only")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;

        let templates = templates_with(vec![endpoint(
            format!("{}/approved-only", server.url()),
            vec![EventType::Approved],
        )])
        .await;
        let notifier = WebhookNotifier::start(&fast_config(vec![]), templates).unwrap();

        notifier.handle(event(EventType::Created)).unwrap();
        notifier.handle(event(EventType::Approved)).unwrap();
        notifier.shutdown().await;

        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_up_to_max_attempts() {
        let mut server = Server::new_async().await;
        let hook = server
            .mock("POST", "/flaky")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let templates = templates_with(vec![]).await;
        let config = fast_config(vec![endpoint(format!("{}/flaky", server.url()), vec![])]);
        let notifier = WebhookNotifier::start(&config, templates).unwrap();

        notifier.handle(event(EventType::Rejected)).unwrap();
        notifier.shutdown().await;

        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = Server::new_async().await;
        let hook = server
            .mock("POST", "/gone")
            .with_status(410)
            .expect(1)
            .create_async()
            .await;

        let templates = templates_with(vec![]).await;
        let config = fast_config(vec![endpoint(format!("{}/gone", server.url()), vec![])]);
        let notifier = WebhookNotifier::start(&config, templates).unwrap();

        notifier.handle(event(EventType::Cancelled)).unwrap();
        notifier.shutdown().await;

        hook.assert_async().await;
    }

    #[tokio::test]
    async fn test_full_queue_drops_event() {
        let templates = templates_with(vec![]).await;
        let config = NotifierConfig {
            workers: 0,
            queue_capacity: 1,
            ..fast_config(vec![])
        };
        let notifier = WebhookNotifier::start(&config, templates).unwrap();

        notifier.handle(event(EventType::Created)).unwrap();
        let dropped = event(EventType::Submitted);
        let dropped_id = dropped.id;
        let err = notifier.handle(dropped).unwrap_err();
        assert!(matches!(err, NotifierError::QueueFull(id) if id == dropped_id));
    }

    #[tokio::test]
    async fn test_handle_after_shutdown_is_closed() {
        let templates = templates_with(vec![]).await;
        let notifier = WebhookNotifier::start(&fast_config(vec![]), templates).unwrap();
        notifier.shutdown().await;

        let err = notifier.handle(event(EventType::Created)).unwrap_err();
        assert!(matches!(err, NotifierError::Closed));
    }
}
