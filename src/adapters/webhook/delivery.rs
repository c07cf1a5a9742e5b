//! HTTP delivery of one event to one endpoint, with retries.

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::domain::models::{NotifierConfig, WorkflowEvent};

/// Why a delivery attempt failed.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("endpoint answered {0}")]
    Status(StatusCode),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl DeliveryError {
    /// Client errors are final except request-timeout and rate-limit.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status(status) => {
                !status.is_client_error()
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Transport(_) => true,
        }
    }
}

/// Retry settings for webhook delivery.
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl From<&NotifierConfig> for DeliveryPolicy {
    fn from(config: &NotifierConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl DeliveryPolicy {
    /// Doubling intervals without jitter, bounded by attempt count rather
    /// than elapsed time.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_interval(self.max_backoff)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// POST `event` to `url`, retrying transient failures per `policy`.
///
/// Returns the number of attempts made on success.
pub async fn deliver(
    client: &Client,
    policy: &DeliveryPolicy,
    url: &str,
    event: &WorkflowEvent,
) -> Result<u32, DeliveryError> {
    let mut attempts = 0u32;
    backoff::future::retry(policy.backoff(), || {
        attempts += 1;
        let attempt = attempts;
        let request = client
            .post(url)
            .header("X-Approvalflow-Event", event.event_type.as_str())
            .header("X-Approvalflow-Delivery", event.id.to_string())
            .json(event);
        async move {
            let outcome = match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => DeliveryError::Status(response.status()),
                Err(e) => DeliveryError::Transport(e),
            };
            if outcome.is_transient() && attempt < policy.max_attempts {
                tracing::debug!(url, attempt, error = %outcome, "Webhook delivery failed, retrying");
                Err(backoff::Error::transient(outcome))
            } else {
                Err(backoff::Error::permanent(outcome))
            }
        }
    })
    .await?;
    Ok(attempts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backoff::backoff::Backoff;

    #[test]
    fn test_status_classification() {
        let transient = [500, 502, 503, 408, 429, 302];
        let permanent = [400, 401, 403, 404, 410, 422];
        for code in transient {
            let err = DeliveryError::Status(StatusCode::from_u16(code).unwrap());
            assert!(err.is_transient(), "{code} should be retried");
        }
        for code in permanent {
            let err = DeliveryError::Status(StatusCode::from_u16(code).unwrap());
            assert!(!err.is_transient(), "{code} should not be retried");
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = DeliveryPolicy {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(300),
        };
        let mut backoff = policy.backoff();
        let millis: Vec<u128> = (0..4)
            .filter_map(|_| backoff.next_backoff())
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(millis, vec![100, 200, 300, 300]);
    }

    #[test]
    fn test_policy_from_config_needs_one_attempt() {
        let config = NotifierConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(DeliveryPolicy::from(&config).max_attempts, 1);
    }
}
