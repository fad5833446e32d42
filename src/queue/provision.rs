//! Queue provisioning (producer side) and discovery (consumer side).

use super::OrderedQueue;
use crate::error::{Error, Result};
use crate::model::{QueueAttributes, QueueHandle};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Look up the queue by name, creating it if it does not exist yet.
///
/// Safe to race with another provisioner or a consumer's discovery loop: a
/// `QueueAlreadyExists` from `create` counts as success.
pub async fn provision_queue<Q: OrderedQueue>(
    queue: &Q,
    name: &str,
    group: &str,
) -> Result<QueueHandle> {
    let existing = queue.list(name).await?;
    if existing.iter().any(|url| url.queue_name() == name) {
        debug!(queue = name, "queue already provisioned");
    } else {
        match queue.create(name, QueueAttributes::default()).await {
            Ok(()) => info!(queue = name, "queue created"),
            Err(Error::QueueAlreadyExists(_)) => {
                debug!(queue = name, "queue created concurrently")
            }
            Err(e) => return Err(e),
        }
    }

    let url = queue.resolve(name).await?;
    Ok(QueueHandle {
        name: name.to_string(),
        group: group.to_string(),
        url,
    })
}

/// Backoff schedule for waiting on a queue that another process creates.
#[derive(Debug, Clone, Copy)]
pub struct DiscoveryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_wait: Duration,
}

impl Default for DiscoveryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            max_wait: Duration::from_secs(300),
        }
    }
}

/// Poll until the named queue exists, then resolve its handle.
///
/// Backs off exponentially between polls and gives up with
/// `QueueDiscoveryTimeout` once `max_wait` has elapsed.
pub async fn await_queue<Q: OrderedQueue>(
    queue: &Q,
    name: &str,
    group: &str,
    policy: DiscoveryPolicy,
) -> Result<QueueHandle> {
    let started = Instant::now();
    let mut backoff = policy.initial_backoff;

    loop {
        if !queue.list(name).await?.is_empty() {
            match queue.resolve(name).await {
                Ok(url) => {
                    metrics::discovery_attempts().add(
                        1,
                        &[
                            KeyValue::new("queue", name.to_string()),
                            KeyValue::new("result", "found"),
                        ],
                    );
                    info!(queue = name, url = %url, "queue discovered");
                    return Ok(QueueHandle {
                        name: name.to_string(),
                        group: group.to_string(),
                        url,
                    });
                }
                // Only a queue sharing the prefix exists so far.
                Err(Error::QueueNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let waited = started.elapsed();
        if waited >= policy.max_wait {
            metrics::discovery_attempts().add(
                1,
                &[
                    KeyValue::new("queue", name.to_string()),
                    KeyValue::new("result", "timeout"),
                ],
            );
            return Err(Error::QueueDiscoveryTimeout {
                name: name.to_string(),
                waited,
            });
        }
        metrics::discovery_attempts().add(
            1,
            &[
                KeyValue::new("queue", name.to_string()),
                KeyValue::new("result", "missing"),
            ],
        );

        let sleep = backoff.min(policy.max_wait - waited);
        debug!(queue = name, backoff_ms = sleep.as_millis() as u64, "queue not found yet");
        tokio::time::sleep(sleep).await;
        backoff = (backoff * 2).min(policy.max_backoff);
    }
}
