//! Core data model.
//!
//! A work item is an image key the producer selected. It travels through the
//! queue as a plain string body and comes back to the consumer as a
//! delivered message carrying a receipt token.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// An object-store key selected for secondary analysis.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(pub String);

impl WorkItem {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference to one image in one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub bucket: String,
    pub key: String,
}

impl ImageRef {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Queue identity
// ---------------------------------------------------------------------------

/// Opaque queue endpoint, e.g. `pgmq://car_images` or `memory://car_images`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueUrl(pub String);

impl QueueUrl {
    /// The queue name is the last path segment of the endpoint.
    pub fn queue_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl std::fmt::Display for QueueUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved ordered channel partition: queue name, FIFO group, endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueHandle {
    pub name: String,
    pub group: String,
    pub url: QueueUrl,
}

/// Attributes requested when creating a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueAttributes {
    pub fifo: bool,
    pub content_based_dedup: bool,
}

impl Default for QueueAttributes {
    fn default() -> Self {
        Self {
            fifo: true,
            content_based_dedup: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Delivery
// ---------------------------------------------------------------------------

/// Handle returned with a delivery, required to delete that delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptToken(pub String);

impl std::fmt::Display for ReceiptToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message handed out by `receive`.
#[derive(Debug, Clone)]
pub struct DeliveredMessage {
    pub body: String,
    pub receipt: ReceiptToken,
    pub group: String,
    pub enqueued_at: DateTime<Utc>,
    /// How many times this message has been handed out, including this one.
    pub receive_count: u32,
}

/// Result of a `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// A new message was enqueued with this id.
    Enqueued(i64),
    /// An identical body was sent within the dedup window; nothing enqueued.
    Duplicate,
}

// ---------------------------------------------------------------------------
// Capability results
// ---------------------------------------------------------------------------

/// A classification label with its confidence (0..=100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TextKind {
    Word,
    Line,
}

/// A text fragment found in an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDetection {
    pub text: String,
    pub kind: TextKind,
}

impl TextDetection {
    pub fn word(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: TextKind::Word,
        }
    }

    pub fn line(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: TextKind::Line,
        }
    }
}

/// Join the WORD fragments as `" " + text` each.
///
/// Returns `None` when no WORD fragment is present.
pub fn concat_words(detections: &[TextDetection]) -> Option<String> {
    let mut words = detections
        .iter()
        .filter(|d| d.kind == TextKind::Word)
        .peekable();
    words.peek()?;
    Some(words.fold(String::new(), |mut acc, d| {
        acc.push(' ');
        acc.push_str(&d.text);
        acc
    }))
}

// ---------------------------------------------------------------------------
// Result Table
// ---------------------------------------------------------------------------

/// Annotation text per image, owned by the consumer until flushed.
#[derive(Debug, Default)]
pub struct ResultTable {
    entries: BTreeMap<WorkItem, String>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns true if the key was already present.
    pub fn record(&mut self, item: WorkItem, text: String) -> bool {
        self.entries.insert(item, text).is_some()
    }

    pub fn get(&self, item: &WorkItem) -> Option<&str> {
        self.entries.get(item).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empty the table and render every entry as an `identifier:text` line.
    ///
    /// Returns the rendered text and the number of lines in it.
    pub fn drain(&mut self) -> (String, usize) {
        let entries = std::mem::take(&mut self.entries);
        let count = entries.len();
        let mut out = String::new();
        for (item, text) in entries {
            out.push_str(item.as_str());
            out.push(':');
            out.push_str(&text);
            out.push('\n');
        }
        (out, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_words_keeps_leading_space_and_skips_lines() {
        let detections = vec![
            TextDetection::line("NJ 1234"),
            TextDetection::word("NJ"),
            TextDetection::word("1234"),
        ];
        assert_eq!(concat_words(&detections).as_deref(), Some(" NJ 1234"));
    }

    #[test]
    fn concat_words_none_without_words() {
        assert_eq!(concat_words(&[]), None);
        assert_eq!(concat_words(&[TextDetection::line("GARDEN STATE")]), None);
    }

    #[test]
    fn result_table_last_write_wins_and_drain_clears() {
        let mut table = ResultTable::new();
        assert!(!table.record(WorkItem::new("b.jpg"), " OLD".into()));
        assert!(table.record(WorkItem::new("b.jpg"), " NEW".into()));
        table.record(WorkItem::new("a.jpg"), " NJ".into());
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&WorkItem::new("b.jpg")), Some(" NEW"));
        assert_eq!(table.get(&WorkItem::new("c.jpg")), None);

        let (text, count) = table.drain();
        assert_eq!(count, 2);
        assert_eq!(text, "a.jpg: NJ\nb.jpg: NEW\n");
        assert!(table.is_empty());
    }

    #[test]
    fn queue_url_name_is_last_segment() {
        let url = QueueUrl("https://sqs.example/123/car_images".into());
        assert_eq!(url.queue_name(), "car_images");
        assert_eq!(QueueUrl("bare".into()).queue_name(), "bare");
    }
}
