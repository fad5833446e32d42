//! Producer: provision the queue, scan and classify, publish, terminate.

use crate::config::Protocol;
use crate::error::Result;
use crate::model::{ImageRef, QueueHandle, SendOutcome, WorkItem};
use crate::queue::{OrderedQueue, provision_queue};
use crate::store::ObjectStore;
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_worker_span};
use crate::vision::Classifier;
use opentelemetry::KeyValue;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{Instrument, debug, info, warn};

const WORKER: &str = "producer";

/// Producer lifecycle, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Provisioning,
    Scanning,
    Terminating,
    Done,
}

impl std::fmt::Display for ProducerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProducerState::Provisioning => "provisioning",
            ProducerState::Scanning => "scanning",
            ProducerState::Terminating => "terminating",
            ProducerState::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// Counts from one producer run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerReport {
    /// Keys listed from the store.
    pub scanned: usize,
    /// Keys whose labels matched the target.
    pub matched: usize,
    /// Matches actually enqueued (not suppressed as duplicates).
    pub published: usize,
    /// Matches the queue suppressed as duplicates.
    pub duplicates: usize,
}

pub struct Producer<Q, S, C> {
    queue: Arc<Q>,
    store: Arc<S>,
    classifier: Arc<C>,
    protocol: Protocol,
}

impl<Q, S, C> Producer<Q, S, C>
where
    Q: OrderedQueue,
    S: ObjectStore,
    C: Classifier,
{
    pub fn new(queue: Arc<Q>, store: Arc<S>, classifier: Arc<C>, protocol: Protocol) -> Self {
        Self {
            queue,
            store,
            classifier,
            protocol,
        }
    }

    /// Look up or create the queue.
    pub async fn provision(&self) -> Result<QueueHandle> {
        provision_queue(
            &*self.queue,
            &self.protocol.queue_name,
            &self.protocol.group_id,
        )
        .await
    }

    /// Lazily list and classify the bucket, yielding matching keys in order.
    pub fn scan(&self) -> Scan<'_, S, C> {
        Scan {
            store: &*self.store,
            classifier: &*self.classifier,
            protocol: &self.protocol,
            buffer: VecDeque::new(),
            continuation: None,
            exhausted: false,
            scanned: 0,
        }
    }

    /// Send one work item under the configured group.
    pub async fn publish(&self, handle: &QueueHandle, item: &WorkItem) -> Result<SendOutcome> {
        let outcome = self
            .queue
            .send(&handle.url, &handle.group, item.as_str())
            .await?;
        match outcome {
            SendOutcome::Enqueued(id) => debug!(key = %item, msg_id = id, "published"),
            SendOutcome::Duplicate => warn!(key = %item, "suppressed as duplicate"),
        }
        Ok(outcome)
    }

    /// Publish the end-of-stream sentinel. Always called, even with no matches.
    pub async fn terminate(&self, handle: &QueueHandle) -> Result<SendOutcome> {
        let outcome = self
            .queue
            .send(&handle.url, &handle.group, &self.protocol.sentinel)
            .await?;
        if outcome == SendOutcome::Duplicate {
            warn!(
                sentinel = %self.protocol.sentinel,
                "sentinel suppressed as duplicate of an earlier run's"
            );
        }
        Ok(outcome)
    }

    /// Provision, scan, publish every match, then terminate.
    ///
    /// Any error aborts the run; messages already sent stay in the queue.
    pub async fn run(&self) -> Result<ProducerReport> {
        let span = start_worker_span(WORKER, &self.protocol.queue_name);
        let transition = |from: ProducerState, to: ProducerState| {
            record_state_transition(&span, WORKER, &from.to_string(), &to.to_string())
        };

        async {
            let handle = self.provision().await?;
            transition(ProducerState::Provisioning, ProducerState::Scanning);

            let mut report = ProducerReport::default();
            let mut scan = self.scan();
            while let Some(item) = scan.next().await? {
                report.matched += 1;
                match self.publish(&handle, &item).await? {
                    SendOutcome::Enqueued(_) => report.published += 1,
                    SendOutcome::Duplicate => report.duplicates += 1,
                }
            }
            report.scanned = scan.scanned();
            transition(ProducerState::Scanning, ProducerState::Terminating);

            self.terminate(&handle).await?;
            transition(ProducerState::Terminating, ProducerState::Done);

            info!(
                scanned = report.scanned,
                matched = report.matched,
                published = report.published,
                duplicates = report.duplicates,
                "producer finished"
            );
            Ok(report)
        }
        .instrument(span.clone())
        .await
    }
}

/// Pull-based scan over the bucket; see [`Producer::scan`].
pub struct Scan<'a, S, C> {
    store: &'a S,
    classifier: &'a C,
    protocol: &'a Protocol,
    buffer: VecDeque<String>,
    continuation: Option<String>,
    exhausted: bool,
    scanned: usize,
}

impl<S: ObjectStore, C: Classifier> Scan<'_, S, C> {
    /// Next matching key, or `None` once the bucket is exhausted.
    pub async fn next(&mut self) -> Result<Option<WorkItem>> {
        loop {
            if let Some(key) = self.buffer.pop_front() {
                self.scanned += 1;
                if self.protocol.is_sentinel(&key) {
                    warn!(key = %key, "object key collides with the sentinel, skipping");
                    continue;
                }
                if self.classify(&key).await? {
                    return Ok(Some(WorkItem(key)));
                }
                continue;
            }

            if self.exhausted {
                return Ok(None);
            }
            let page = self
                .store
                .list_page(
                    &self.protocol.bucket,
                    self.protocol.page_size,
                    self.continuation.as_deref(),
                )
                .await?;
            self.exhausted = page.next.is_none();
            self.continuation = page.next;
            self.buffer.extend(page.keys);
        }
    }

    /// Keys listed so far.
    pub fn scanned(&self) -> usize {
        self.scanned
    }

    async fn classify(&self, key: &str) -> Result<bool> {
        info!(key, bucket = %self.protocol.bucket, "classifying image");
        let image = ImageRef::new(&self.protocol.bucket, key);
        let labels = self
            .classifier
            .detect_labels(&image, self.protocol.min_confidence)
            .await?;

        let matched = labels.iter().any(|label| {
            label.name == self.protocol.target_label
                && label.confidence >= self.protocol.min_confidence
        });
        metrics::images_classified().add(
            1,
            &[KeyValue::new(
                "result",
                if matched { "matched" } else { "skipped" },
            )],
        );
        Ok(matched)
    }
}
