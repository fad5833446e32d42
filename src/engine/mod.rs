//! The two workers: a producer that classifies and publishes, and a
//! consumer that annotates and aggregates.

pub mod consumer;
pub mod producer;

pub use consumer::{Consumer, ConsumerConfig, ConsumerReport, ConsumerState, Termination};
pub use producer::{Producer, ProducerReport, ProducerState};
