//! In-process ordered queue.
//!
//! Implements the full queue contract (FIFO groups, content dedup window,
//! visibility timeout, receipt-scoped delete) over a mutex-guarded map.
//! Cloning shares the same queues, so a producer and a consumer can run
//! against one instance in the same process.

use super::OrderedQueue;
use crate::error::{Error, Result};
use crate::model::{DeliveredMessage, QueueAttributes, QueueUrl, ReceiptToken, SendOutcome};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

const SCHEME: &str = "memory://";

/// Timing knobs for the in-memory queue.
#[derive(Debug, Clone, Copy)]
pub struct MemoryQueueSettings {
    pub visibility_timeout: Duration,
    pub dedup_window: Duration,
}

impl Default for MemoryQueueSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(30),
            dedup_window: Duration::from_secs(300),
        }
    }
}

/// Point-in-time counters for one queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Messages not yet deleted, in flight or not.
    pub pending: usize,
    /// Messages handed out whose visibility timeout has not expired.
    pub in_flight: usize,
    /// Highest `in_flight` ever observed right after a receive.
    pub max_in_flight: usize,
    pub sent: u64,
    pub duplicates: u64,
    pub deleted: u64,
}

#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Mutex<Inner>>,
    settings: MemoryQueueSettings,
}

#[derive(Default)]
struct Inner {
    queues: BTreeMap<String, QueueState>,
    creates: u64,
}

struct QueueState {
    attributes: QueueAttributes,
    messages: Vec<Stored>,
    dedup: HashMap<String, Instant>,
    next_id: i64,
    stats: QueueStats,
}

struct Stored {
    id: i64,
    group: String,
    body: String,
    enqueued_at: DateTime<Utc>,
    receive_count: u32,
    lease: Option<Lease>,
}

struct Lease {
    receipt: ReceiptToken,
    visible_at: Instant,
}

impl Stored {
    fn in_flight(&self, now: Instant) -> bool {
        self.lease.as_ref().is_some_and(|l| l.visible_at > now)
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: MemoryQueueSettings) -> Self {
        Self {
            inner: Arc::default(),
            settings,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live queues.
    pub fn queue_count(&self) -> usize {
        self.lock().queues.len()
    }

    /// Number of successful `create` calls across all queues.
    pub fn create_count(&self) -> u64 {
        self.lock().creates
    }

    /// Attributes a queue was created with.
    pub fn attributes(&self, name: &str) -> Option<QueueAttributes> {
        self.lock().queues.get(name).map(|q| q.attributes)
    }

    pub fn stats(&self, url: &QueueUrl) -> Result<QueueStats> {
        let inner = self.lock();
        let queue = queue_for(&inner, url)?;
        let now = Instant::now();
        Ok(QueueStats {
            pending: queue.messages.len(),
            in_flight: queue.messages.iter().filter(|m| m.in_flight(now)).count(),
            ..queue.stats
        })
    }

    /// Bodies still pending, in enqueue order.
    pub fn pending_bodies(&self, url: &QueueUrl) -> Result<Vec<String>> {
        let inner = self.lock();
        let queue = queue_for(&inner, url)?;
        Ok(queue.messages.iter().map(|m| m.body.clone()).collect())
    }

    fn create_sync(&self, name: &str, attributes: QueueAttributes) -> Result<()> {
        let mut inner = self.lock();
        if inner.queues.contains_key(name) {
            return Err(Error::QueueAlreadyExists(name.to_string()));
        }
        inner.queues.insert(
            name.to_string(),
            QueueState {
                attributes,
                messages: Vec::new(),
                dedup: HashMap::new(),
                next_id: 1,
                stats: QueueStats::default(),
            },
        );
        inner.creates += 1;
        Ok(())
    }

    fn send_sync(&self, url: &QueueUrl, group: &str, body: &str) -> Result<SendOutcome> {
        let mut inner = self.lock();
        let window = self.settings.dedup_window;
        let queue = queue_for_mut(&mut inner, url)?;
        let now = Instant::now();

        if queue.attributes.content_based_dedup {
            queue
                .dedup
                .retain(|_, sent_at| now.duration_since(*sent_at) < window);
            if queue.dedup.contains_key(body) {
                queue.stats.duplicates += 1;
                return Ok(SendOutcome::Duplicate);
            }
            queue.dedup.insert(body.to_string(), now);
        }

        let id = queue.next_id;
        queue.next_id += 1;
        queue.messages.push(Stored {
            id,
            group: group.to_string(),
            body: body.to_string(),
            enqueued_at: Utc::now(),
            receive_count: 0,
            lease: None,
        });
        queue.stats.sent += 1;
        Ok(SendOutcome::Enqueued(id))
    }

    fn receive_sync(&self, url: &QueueUrl, max: usize) -> Result<Vec<DeliveredMessage>> {
        let mut inner = self.lock();
        let visibility = self.settings.visibility_timeout;
        let queue = queue_for_mut(&mut inner, url)?;
        let now = Instant::now();
        let fifo = queue.attributes.fifo;

        let mut blocked: HashSet<String> = HashSet::new();
        let mut delivered = Vec::new();
        for message in queue.messages.iter_mut() {
            if delivered.len() >= max {
                break;
            }
            if blocked.contains(&message.group) {
                continue;
            }
            if message.in_flight(now) {
                // A group stays blocked behind its oldest undeleted delivery.
                if fifo {
                    blocked.insert(message.group.clone());
                }
                continue;
            }

            let receipt = ReceiptToken(format!("{}:{}", message.id, Uuid::new_v4()));
            message.receive_count += 1;
            message.lease = Some(Lease {
                receipt: receipt.clone(),
                visible_at: now + visibility,
            });
            delivered.push(DeliveredMessage {
                body: message.body.clone(),
                receipt,
                group: message.group.clone(),
                enqueued_at: message.enqueued_at,
                receive_count: message.receive_count,
            });
            if fifo {
                blocked.insert(message.group.clone());
            }
        }

        let in_flight = queue.messages.iter().filter(|m| m.in_flight(now)).count();
        queue.stats.max_in_flight = queue.stats.max_in_flight.max(in_flight);
        Ok(delivered)
    }

    fn delete_sync(&self, url: &QueueUrl, receipt: &ReceiptToken) -> Result<()> {
        let mut inner = self.lock();
        let queue = queue_for_mut(&mut inner, url)?;
        let position = queue
            .messages
            .iter()
            .position(|m| m.lease.as_ref().is_some_and(|l| &l.receipt == receipt))
            .ok_or_else(|| Error::InvalidReceipt {
                queue: url.queue_name().to_string(),
                receipt: receipt.to_string(),
            })?;
        queue.messages.remove(position);
        queue.stats.deleted += 1;
        Ok(())
    }
}

fn queue_for<'a>(inner: &'a Inner, url: &QueueUrl) -> Result<&'a QueueState> {
    inner
        .queues
        .get(url.queue_name())
        .ok_or_else(|| Error::QueueNotFound(url.to_string()))
}

fn queue_for_mut<'a>(inner: &'a mut Inner, url: &QueueUrl) -> Result<&'a mut QueueState> {
    inner
        .queues
        .get_mut(url.queue_name())
        .ok_or_else(|| Error::QueueNotFound(url.to_string()))
}

impl OrderedQueue for MemoryQueue {
    async fn list(&self, prefix: &str) -> Result<Vec<QueueUrl>> {
        let inner = self.lock();
        Ok(inner
            .queues
            .keys()
            .filter(|name| name.starts_with(prefix))
            .map(|name| QueueUrl(format!("{SCHEME}{name}")))
            .collect())
    }

    async fn create(&self, name: &str, attributes: QueueAttributes) -> Result<()> {
        self.create_sync(name, attributes)
    }

    async fn resolve(&self, name: &str) -> Result<QueueUrl> {
        if self.lock().queues.contains_key(name) {
            Ok(QueueUrl(format!("{SCHEME}{name}")))
        } else {
            Err(Error::QueueNotFound(name.to_string()))
        }
    }

    async fn send(&self, url: &QueueUrl, group: &str, body: &str) -> Result<SendOutcome> {
        self.send_sync(url, group, body)
    }

    async fn receive(&self, url: &QueueUrl, max: usize) -> Result<Vec<DeliveredMessage>> {
        self.receive_sync(url, max)
    }

    async fn delete(&self, url: &QueueUrl, receipt: &ReceiptToken) -> Result<()> {
        self.delete_sync(url, receipt)
    }
}
