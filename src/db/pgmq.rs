//! Ordered queue on pgmq via direct SQLx.
//!
//! Queue lifecycle goes through pgmq's SQL functions (`pgmq.create`,
//! `pgmq.send`, `pgmq.list_queues`). Receive and delete work on the queue
//! table directly so that FIFO groups and receipt checks hold:
//!
//! - each message is stored as `{"group": .., "body": ..}`;
//! - receive hands out the oldest message of a group only when that group
//!   has nothing in flight;
//! - the receipt is `msg_id:read_ct`, so a redelivered message invalidates
//!   the older receipt.
//!
//! Content-based dedup is kept in the `queue_dedup` table.

use crate::error::{Error, Result};
use crate::model::{DeliveredMessage, QueueAttributes, QueueUrl, ReceiptToken, SendOutcome};
use crate::queue::OrderedQueue;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;
use serde::{Deserialize, Serialize};

const SCHEME: &str = "pgmq://";

/// pgmq prefixes table names, which caps queue names below Postgres' 63.
const MAX_QUEUE_NAME: usize = 47;

/// Wire shape of a queued message.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    group: String,
    body: String,
}

fn count(queue: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}

/// pgmq names become part of a table name, so only `[A-Za-z0-9_]` is allowed.
pub fn validate_queue_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_QUEUE_NAME
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidQueueName(name.to_string()))
    }
}

fn parse_receipt(queue: &str, receipt: &ReceiptToken) -> Result<(i64, i32)> {
    let invalid = || Error::InvalidReceipt {
        queue: queue.to_string(),
        receipt: receipt.to_string(),
    };
    let (msg_id, read_ct) = receipt.0.split_once(':').ok_or_else(invalid)?;
    Ok((
        msg_id.parse().map_err(|_| invalid())?,
        read_ct.parse().map_err(|_| invalid())?,
    ))
}

impl super::Db {
    async fn receive_one(&self, queue: &str) -> Result<Option<DeliveredMessage>> {
        let sql = format!(
            "WITH heads AS (
                 SELECT DISTINCT ON (message->>'group') msg_id, vt
                 FROM pgmq.q_{queue}
                 ORDER BY message->>'group', msg_id
             ),
             ready AS (
                 SELECT msg_id FROM heads
                 WHERE vt <= clock_timestamp()
                 ORDER BY msg_id
                 LIMIT 1
             )
             UPDATE pgmq.q_{queue} AS q
             SET vt = clock_timestamp() + make_interval(secs => $1),
                 read_ct = q.read_ct + 1
             FROM ready
             WHERE q.msg_id = ready.msg_id AND q.vt <= clock_timestamp()
             RETURNING q.msg_id, q.read_ct, q.enqueued_at, q.message"
        );
        let row = sqlx::query_as::<
            _,
            (
                i64,
                i32,
                chrono::DateTime<chrono::Utc>,
                serde_json::Value,
            ),
        >(&sql)
        .bind(self.settings.visibility_timeout.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        let Some((msg_id, read_ct, enqueued_at, message)) = row else {
            return Ok(None);
        };
        let envelope: Envelope =
            serde_json::from_value(message).map_err(|e| Error::MalformedMessage {
                queue: queue.to_string(),
                msg_id,
                reason: e.to_string(),
            })?;

        Ok(Some(DeliveredMessage {
            body: envelope.body,
            receipt: ReceiptToken(format!("{msg_id}:{read_ct}")),
            group: envelope.group,
            enqueued_at,
            receive_count: read_ct.max(0) as u32,
        }))
    }
}

impl OrderedQueue for super::Db {
    async fn list(&self, prefix: &str) -> Result<Vec<QueueUrl>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT queue_name::text FROM pgmq.list_queues()
             WHERE starts_with(queue_name::text, $1)
             ORDER BY queue_name",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;
        count(prefix, "list");
        Ok(rows
            .into_iter()
            .map(|(name,)| QueueUrl(format!("{SCHEME}{name}")))
            .collect())
    }

    /// pgmq creation is idempotent, so this never reports `QueueAlreadyExists`.
    /// Every pgmq queue is FIFO by group and deduplicated by content.
    async fn create(&self, name: &str, _attributes: QueueAttributes) -> Result<()> {
        validate_queue_name(name)?;
        sqlx::query("SELECT pgmq.create($1)")
            .bind(name)
            .execute(&self.pool)
            .await?;
        count(name, "create");
        Ok(())
    }

    async fn resolve(&self, name: &str) -> Result<QueueUrl> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM pgmq.list_queues() WHERE queue_name = $1)",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        if exists {
            Ok(QueueUrl(format!("{SCHEME}{name}")))
        } else {
            Err(Error::QueueNotFound(name.to_string()))
        }
    }

    async fn send(&self, url: &QueueUrl, group: &str, body: &str) -> Result<SendOutcome> {
        let queue = url.queue_name();
        let mut tx = self.pool.begin().await?;

        // Rows past the window can no longer suppress anything.
        sqlx::query(
            "DELETE FROM queue_dedup
             WHERE queue_name = $1 AND sent_at < now() - make_interval(secs => $2)",
        )
        .bind(queue)
        .bind(self.settings.dedup_window.as_secs_f64())
        .execute(&mut *tx)
        .await?;

        // Claim the body for this window; an existing fresh row means duplicate.
        let claimed: Option<(String,)> = sqlx::query_as(
            "INSERT INTO queue_dedup (queue_name, body, sent_at)
             VALUES ($1, $2, now())
             ON CONFLICT (queue_name, body) DO NOTHING
             RETURNING queue_name",
        )
        .bind(queue)
        .bind(body)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            tx.rollback().await?;
            count(queue, "send_duplicate");
            return Ok(SendOutcome::Duplicate);
        }

        let payload = serde_json::to_value(Envelope {
            group: group.to_string(),
            body: body.to_string(),
        })
        .map_err(|e| Error::Other(format!("serialize message: {e}")))?;

        let (msg_id,): (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2)")
            .bind(queue)
            .bind(&payload)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("UPDATE queue_dedup SET msg_id = $1 WHERE queue_name = $2 AND body = $3")
            .bind(msg_id)
            .bind(queue)
            .bind(body)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        count(queue, "send");
        Ok(SendOutcome::Enqueued(msg_id))
    }

    async fn receive(&self, url: &QueueUrl, max: usize) -> Result<Vec<DeliveredMessage>> {
        let queue = url.queue_name();
        validate_queue_name(queue)?;

        let mut delivered = Vec::new();
        while delivered.len() < max {
            match self.receive_one(queue).await? {
                Some(message) => delivered.push(message),
                None => break,
            }
        }

        count(
            queue,
            if delivered.is_empty() {
                "receive_empty"
            } else {
                "receive"
            },
        );
        Ok(delivered)
    }

    async fn delete(&self, url: &QueueUrl, receipt: &ReceiptToken) -> Result<()> {
        let queue = url.queue_name();
        validate_queue_name(queue)?;
        let (msg_id, read_ct) = parse_receipt(queue, receipt)?;

        let sql = format!(
            "DELETE FROM pgmq.q_{queue} WHERE msg_id = $1 AND read_ct = $2 RETURNING msg_id"
        );
        let deleted: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(msg_id)
            .bind(read_ct)
            .fetch_optional(&self.pool)
            .await?;

        if deleted.is_none() {
            return Err(Error::InvalidReceipt {
                queue: queue.to_string(),
                receipt: receipt.to_string(),
            });
        }
        count(queue, "delete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_are_identifier_safe() {
        assert!(validate_queue_name("car_images").is_ok());
        assert!(validate_queue_name("CS643862").is_ok());
        assert!(validate_queue_name("CS643862.fifo").is_err());
        assert!(validate_queue_name("a; DROP TABLE x").is_err());
        assert!(validate_queue_name("").is_err());
        assert!(validate_queue_name(&"q".repeat(48)).is_err());
    }

    #[test]
    fn receipts_round_trip_through_parse() {
        let receipt = ReceiptToken("42:3".to_string());
        assert_eq!(parse_receipt("q", &receipt).unwrap(), (42, 3));
        assert!(parse_receipt("q", &ReceiptToken("42".into())).is_err());
        assert!(parse_receipt("q", &ReceiptToken("x:1".into())).is_err());
    }
}
