//! Consumer: discover the queue, drain it one message at a time, flush.
//!
//! `AwaitingQueue → Draining → Flushing → Done`. While draining, every
//! delivery is deleted before the next receive, so at most one message is
//! ever in flight.

use crate::config::Protocol;
use crate::error::{Error, Result};
use crate::model::{DeliveredMessage, ImageRef, QueueHandle, ResultTable, WorkItem, concat_words};
use crate::output::ResultSink;
use crate::queue::{DiscoveryPolicy, OrderedQueue, await_queue};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_worker_span};
use crate::vision::Annotator;
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, error, info, warn};

const WORKER: &str = "consumer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    AwaitingQueue,
    Draining,
    Flushing,
    Done,
}

impl ConsumerState {
    pub fn can_transition_to(self, to: ConsumerState) -> bool {
        use ConsumerState::*;
        matches!(
            (self, to),
            (AwaitingQueue, Draining) | (Draining, Flushing) | (Flushing, Done)
        )
    }
}

impl std::fmt::Display for ConsumerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConsumerState::AwaitingQueue => "awaiting_queue",
            ConsumerState::Draining => "draining",
            ConsumerState::Flushing => "flushing",
            ConsumerState::Done => "done",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub discovery: DiscoveryPolicy,
    /// Sleep between receives that come back empty.
    pub poll_interval: Duration,
    /// Stop draining after this long without a delivery. `None` waits for
    /// the sentinel forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            discovery: DiscoveryPolicy::default(),
            poll_interval: Duration::from_millis(200),
            idle_timeout: None,
        }
    }
}

/// Why draining stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Sentinel,
    IdleTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerReport {
    /// Image messages handled (sentinel excluded).
    pub processed: usize,
    /// Images with at least one word of text.
    pub annotated: usize,
    /// Lines written by the flush; 0 if it failed.
    pub results_written: usize,
    pub termination: Termination,
    /// Set when the flush failed; the drained results are lost.
    pub flush_error: Option<String>,
}

pub struct Consumer<Q, A, K> {
    queue: Arc<Q>,
    annotator: Arc<A>,
    sink: K,
    protocol: Protocol,
    config: ConsumerConfig,
    state: ConsumerState,
    results: ResultTable,
    processed: usize,
    annotated: usize,
}

impl<Q, A, K> Consumer<Q, A, K>
where
    Q: OrderedQueue,
    A: Annotator,
    K: ResultSink,
{
    pub fn new(
        queue: Arc<Q>,
        annotator: Arc<A>,
        sink: K,
        protocol: Protocol,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            queue,
            annotator,
            sink,
            protocol,
            config,
            state: ConsumerState::AwaitingQueue,
            results: ResultTable::new(),
            processed: 0,
            annotated: 0,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Run the state machine to `Done`.
    ///
    /// Queue and annotation errors abort the run. A failed flush does not.
    pub async fn run(&mut self) -> Result<ConsumerReport> {
        let span = start_worker_span(WORKER, &self.protocol.queue_name);
        self.drive(&span).instrument(span.clone()).await
    }

    async fn drive(&mut self, span: &Span) -> Result<ConsumerReport> {
        let handle = await_queue(
            &*self.queue,
            &self.protocol.queue_name,
            &self.protocol.group_id,
            self.config.discovery,
        )
        .await?;
        self.advance(span, ConsumerState::Draining)?;

        let termination = self.drain(&handle).await?;
        self.advance(span, ConsumerState::Flushing)?;

        let flushed = self.flush().await;
        self.advance(span, ConsumerState::Done)?;

        let (results_written, flush_error) = match flushed {
            Ok(lines) => (lines, None),
            Err(e) => (0, Some(e.to_string())),
        };
        info!(
            processed = self.processed,
            annotated = self.annotated,
            results_written,
            ?termination,
            "consumer finished"
        );
        Ok(ConsumerReport {
            processed: self.processed,
            annotated: self.annotated,
            results_written,
            termination,
            flush_error,
        })
    }

    fn advance(&mut self, span: &Span, to: ConsumerState) -> Result<()> {
        let from = self.state;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        record_state_transition(span, WORKER, &from.to_string(), &to.to_string());
        self.state = to;
        Ok(())
    }

    async fn drain(&mut self, handle: &QueueHandle) -> Result<Termination> {
        let mut last_delivery = Instant::now();
        loop {
            let Some(message) = self.queue.receive(&handle.url, 1).await?.into_iter().next()
            else {
                if let Some(limit) = self.config.idle_timeout {
                    if last_delivery.elapsed() >= limit {
                        warn!(
                            idle_ms = limit.as_millis() as u64,
                            "no sentinel received before idle timeout, flushing early"
                        );
                        return Ok(Termination::IdleTimeout);
                    }
                }
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            };
            last_delivery = Instant::now();

            let is_sentinel = self.protocol.is_sentinel(&message.body);
            if !is_sentinel {
                self.handle_image(&message).await?;
            }
            // Delete before the next receive, whatever the branch.
            self.queue.delete(&handle.url, &message.receipt).await?;

            if is_sentinel {
                info!("sentinel received");
                return Ok(Termination::Sentinel);
            }
        }
    }

    async fn handle_image(&mut self, message: &DeliveredMessage) -> Result<()> {
        let item = WorkItem::new(message.body.as_str());
        if message.receive_count > 1 {
            warn!(key = %item, receive_count = message.receive_count, "redelivered message");
        }
        info!(key = %item, bucket = %self.protocol.bucket, "annotating image");

        let image = ImageRef::new(&self.protocol.bucket, item.as_str());
        let detections = self.annotator.detect_text(&image).await?;
        self.processed += 1;

        match concat_words(&detections) {
            Some(text) => {
                if self.results.record(item.clone(), text) {
                    debug!(key = %item, "result overwritten");
                }
                self.annotated += 1;
                metrics::images_annotated().add(1, &[KeyValue::new("result", "text")]);
            }
            None => {
                debug!(key = %item, fragments = detections.len(), "no words found");
                metrics::images_annotated().add(1, &[KeyValue::new("result", "no_text")]);
            }
        }
        Ok(())
    }

    /// Take everything out of the table and write it in one append.
    async fn flush(&mut self) -> std::io::Result<usize> {
        let (text, lines) = self.results.drain();
        match self.sink.write_results(&text).await {
            Ok(()) => {
                info!(lines, "results written");
                metrics::results_flushed().add(lines as u64, &[KeyValue::new("result", "ok")]);
                Ok(lines)
            }
            Err(e) => {
                error!(lines, error = %e, "failed to write results");
                metrics::results_flushed().add(lines as u64, &[KeyValue::new("result", "error")]);
                Err(e)
            }
        }
    }
}
