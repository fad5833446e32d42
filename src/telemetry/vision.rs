//! Span helpers for capability calls (label and text detection).

use crate::model::ImageRef;
use tracing::Span;

/// Start a span for one capability call on one image.
///
/// `vision.results` is declared empty and filled via [`record_result_count`].
pub fn start_vision_span(operation: &str, image: &ImageRef) -> Span {
    tracing::info_span!(
        "vision.call",
        "vision.operation" = operation,
        "image.bucket" = %image.bucket,
        "image.key" = %image.key,
        "vision.results" = tracing::field::Empty,
    )
}

/// Record how many labels or text fragments the call returned.
pub fn record_result_count(span: &Span, count: usize) {
    span.record("vision.results", count as u64);
}
