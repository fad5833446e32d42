//! Error types for carscan.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("queue not found: {0}")]
    QueueNotFound(String),

    #[error("queue already exists: {0}")]
    QueueAlreadyExists(String),

    #[error("queue {name} did not appear within {waited:?}")]
    QueueDiscoveryTimeout { name: String, waited: Duration },

    #[error("invalid receipt for queue {queue}: {receipt}")]
    InvalidReceipt { queue: String, receipt: String },

    #[error("invalid queue name: {0}")]
    InvalidQueueName(String),

    #[error("malformed message {msg_id} in {queue}: {reason}")]
    MalformedMessage {
        queue: String,
        msg_id: i64,
        reason: String,
    },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("vision service error: {0}")]
    Vision(String),

    #[error("object store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
