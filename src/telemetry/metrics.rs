//! Metric instrument factories for carscan.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"carscan"` meter.

use opentelemetry::metrics::{Counter, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("carscan")
}

/// Counter: queue-level operations.
/// Labels: `queue`, `operation` ("list" | "create" | "send" | "send_duplicate"
/// | "receive" | "receive_empty" | "delete").
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("carscan.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Counter: discovery polls made while waiting for a queue to appear.
/// Labels: `queue`, `result` ("missing" | "found" | "timeout").
pub fn discovery_attempts() -> Counter<u64> {
    meter()
        .u64_counter("carscan.queue.discovery_attempts")
        .with_description("Queue discovery polls")
        .build()
}

/// Counter: images classified by the producer.
/// Labels: `result` ("matched" | "skipped").
pub fn images_classified() -> Counter<u64> {
    meter()
        .u64_counter("carscan.producer.images_classified")
        .with_description("Images classified by the producer")
        .build()
}

/// Counter: images annotated by the consumer.
/// Labels: `result` ("text" | "no_text").
pub fn images_annotated() -> Counter<u64> {
    meter()
        .u64_counter("carscan.consumer.images_annotated")
        .with_description("Images annotated by the consumer")
        .build()
}

/// Counter: result lines flushed to the output sink.
/// Labels: `result` ("ok" | "error").
pub fn results_flushed() -> Counter<u64> {
    meter()
        .u64_counter("carscan.consumer.results_flushed")
        .with_description("Result lines flushed to the output sink")
        .build()
}

/// Counter: worker state machine transitions.
/// Labels: `worker`, `from`, `to`.
pub fn state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("carscan.worker.state_transitions")
        .with_description("Worker state machine transitions")
        .build()
}
