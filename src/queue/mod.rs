//! Ordered queue contract.
//!
//! The queue is the only channel between producer and consumer. An
//! implementation must provide:
//!
//! - FIFO delivery within a group: the head of a group is not handed out
//!   while an earlier message of that group is still in flight.
//! - Content-based deduplication: an identical body sent within the dedup
//!   window is suppressed.
//! - Receipt-scoped deletion: a delivery can only be deleted with the receipt
//!   it came with. A message that outlives its visibility timeout is handed
//!   out again under a fresh receipt.
//!
//! [`memory::MemoryQueue`] implements this in-process; [`crate::db::Db`]
//! implements it on Postgres with pgmq.

pub mod memory;
pub mod provision;

use crate::error::Result;
use crate::model::{DeliveredMessage, QueueAttributes, QueueUrl, ReceiptToken, SendOutcome};
use std::future::Future;

pub use memory::MemoryQueue;
pub use provision::{DiscoveryPolicy, await_queue, provision_queue};

pub trait OrderedQueue: Send + Sync {
    /// Endpoints of all queues whose name starts with `prefix`.
    fn list(&self, prefix: &str) -> impl Future<Output = Result<Vec<QueueUrl>>> + Send;

    /// Create a queue. Fails with `QueueAlreadyExists` if the name is taken
    /// and the backend reports it.
    fn create(
        &self,
        name: &str,
        attributes: QueueAttributes,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Endpoint for an exact queue name. Fails with `QueueNotFound`.
    fn resolve(&self, name: &str) -> impl Future<Output = Result<QueueUrl>> + Send;

    fn send(
        &self,
        url: &QueueUrl,
        group: &str,
        body: &str,
    ) -> impl Future<Output = Result<SendOutcome>> + Send;

    /// Receive up to `max` messages. May return none.
    fn receive(
        &self,
        url: &QueueUrl,
        max: usize,
    ) -> impl Future<Output = Result<Vec<DeliveredMessage>>> + Send;

    fn delete(
        &self,
        url: &QueueUrl,
        receipt: &ReceiptToken,
    ) -> impl Future<Output = Result<()>> + Send;
}
