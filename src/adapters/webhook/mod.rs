//! Webhook event delivery.

pub mod delivery;
pub mod notifier;

pub use delivery::{deliver, DeliveryError, DeliveryPolicy};
pub use notifier::WebhookNotifier;
