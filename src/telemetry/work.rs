//! Worker span helpers.
//!
//! One span covers a whole producer or consumer run; state machine
//! transitions are recorded as events inside it.

use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use tracing::Span;

/// Start the span for a worker run against `queue`.
///
/// The `worker.state` field is declared empty and updated by
/// [`record_state_transition`].
pub fn start_worker_span(worker: &str, queue: &str) -> Span {
    tracing::info_span!(
        "worker.run",
        "worker.role" = worker,
        "queue.name" = queue,
        "worker.state" = tracing::field::Empty,
    )
}

/// Record a state transition event on the given span and count it.
pub fn record_state_transition(span: &Span, worker: &str, from: &str, to: &str) {
    span.record("worker.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
    metrics::state_transitions().add(
        1,
        &[
            KeyValue::new("worker", worker.to_string()),
            KeyValue::new("from", from.to_string()),
            KeyValue::new("to", to.to_string()),
        ],
    );
}
