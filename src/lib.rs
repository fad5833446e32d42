//! # carscan
//!
//! Two workers coordinated only through an ordered queue. The producer
//! classifies the images in a bucket and publishes those that show a car.
//! The consumer reads the text in each published image and writes one
//! `key:text` line per image.
//!
//! The queue (pgmq on Postgres, or in-memory) provides FIFO groups and
//! content dedup. A sentinel published last ends the consumer's drain.

pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod output;
pub mod queue;
pub mod store;
pub mod telemetry;
pub mod vision;
