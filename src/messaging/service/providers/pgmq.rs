//! # PGMQ Messaging Service
//!
//! Durable queues on the PostgreSQL `pgmq` extension, driven through its SQL
//! functions on a dedicated pool. A send returns only after the row is
//! committed, and every received message stays in the queue table until it is
//! deleted or archived, so a crash after enqueue never loses a task.
//!
//! | Operation | SQL |
//! |---|---|
//! | create | `pgmq.create(queue)` |
//! | send | `pgmq.send(queue, msg, delay)` |
//! | read | `pgmq.read(queue, vt, qty)` |
//! | ack | `pgmq.delete(queue, msg_id)` |
//! | retry later | `pgmq.set_vt(queue, msg_id, vt)` |
//! | archive | `pgmq.archive(queue, msg_id)` |
//! | stats | `pgmq.metrics(queue)` |

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tracing::{debug, info};

use crate::constants::system::MAX_VISIBILITY_TIMEOUT_SECONDS;
use crate::messaging::service::traits::{MessagingService, QueueMessage};
use crate::messaging::service::types::{
    MessageId, QueueHealthReport, QueueStats, QueuedMessage, ReceiptHandle,
};
use crate::messaging::MessagingError;

#[derive(Debug, FromRow)]
struct PgmqMessageRow {
    msg_id: i64,
    read_ct: i32,
    enqueued_at: DateTime<Utc>,
    message: serde_json::Value,
}

#[derive(Debug, FromRow)]
struct PgmqMetricsRow {
    queue_length: Option<i64>,
    oldest_msg_age_sec: Option<i32>,
}

/// pgmq-backed [`MessagingService`]
#[derive(Debug)]
pub struct PgmqMessagingService {
    pool: PgPool,
    closed: AtomicBool,
}

/// Whole seconds for pgmq, rounded up and clamped to the supported visibility range
fn as_pgmq_seconds(duration: Duration) -> i32 {
    let seconds = duration.as_secs() + u64::from(duration.subsec_nanos() > 0);
    seconds
        .min(MAX_VISIBILITY_TIMEOUT_SECONDS)
        .try_into()
        .unwrap_or(i32::MAX)
}

fn message_id(receipt_handle: &ReceiptHandle) -> Result<i64, MessagingError> {
    receipt_handle
        .as_i64()
        .ok_or_else(|| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))
}

impl PgmqMessagingService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            closed: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn ensure_open(&self) -> Result<(), MessagingError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingService for PgmqMessagingService {
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "create", e.to_string()))?;
        info!(queue = %queue_name, "Queue ensured");
        Ok(())
    }

    async fn verify_queues(
        &self,
        queue_names: &[String],
    ) -> Result<QueueHealthReport, MessagingError> {
        let existing: Vec<(String,)> = sqlx::query_as("SELECT queue_name FROM pgmq.list_queues()")
            .fetch_all(&self.pool)
            .await?;

        let mut report = QueueHealthReport::new();
        for name in queue_names {
            if existing.iter().any(|(existing,)| existing == name) {
                report.add_healthy(name);
            } else {
                report.add_missing(name);
            }
        }
        Ok(report)
    }

    async fn send_delayed<T: QueueMessage>(
        &self,
        queue_name: &str,
        message: &T,
        delay: Duration,
    ) -> Result<MessageId, MessagingError> {
        self.ensure_open()?;
        let bytes = message.to_bytes()?;
        let json: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| MessagingError::message_serialization(e.to_string()))?;

        let (msg_id,): (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2, $3)")
            .bind(queue_name)
            .bind(&json)
            .bind(as_pgmq_seconds(delay))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "send", e.to_string()))?;

        debug!(queue = %queue_name, msg_id = msg_id, "Message sent");
        Ok(MessageId::from(msg_id))
    }

    async fn receive_messages<T: QueueMessage>(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError> {
        let qty = i32::try_from(max_messages).unwrap_or(i32::MAX);
        let rows: Vec<PgmqMessageRow> = sqlx::query_as(
            "SELECT msg_id, read_ct, enqueued_at, message FROM pgmq.read($1, $2, $3)",
        )
        .bind(queue_name)
        .bind(as_pgmq_seconds(visibility_timeout))
        .bind(qty)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| MessagingError::queue_operation(queue_name, "read", e.to_string()))?;

        rows.into_iter()
            .map(|row| -> Result<QueuedMessage<T>, MessagingError> {
                let bytes = serde_json::to_vec(&row.message)?;
                Ok(QueuedMessage::new(
                    ReceiptHandle::from(row.msg_id),
                    T::from_bytes(&bytes)?,
                    u32::try_from(row.read_ct).unwrap_or(0),
                    row.enqueued_at,
                ))
            })
            .collect()
    }

    async fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let msg_id = message_id(receipt_handle)?;
        let (deleted,): (bool,) = sqlx::query_as("SELECT pgmq.delete($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "delete", e.to_string()))?;
        if deleted {
            Ok(())
        } else {
            Err(MessagingError::message_not_found(msg_id.to_string()))
        }
    }

    async fn retry_later(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        delay: Duration,
    ) -> Result<(), MessagingError> {
        let msg_id = message_id(receipt_handle)?;
        let updated: Option<(i64,)> = sqlx::query_as("SELECT msg_id FROM pgmq.set_vt($1, $2, $3)")
            .bind(queue_name)
            .bind(msg_id)
            .bind(as_pgmq_seconds(delay))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "set_vt", e.to_string()))?;
        updated
            .map(|_| ())
            .ok_or_else(|| MessagingError::message_not_found(msg_id.to_string()))
    }

    async fn archive_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let msg_id = message_id(receipt_handle)?;
        let (archived,): (bool,) = sqlx::query_as("SELECT pgmq.archive($1, $2)")
            .bind(queue_name)
            .bind(msg_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "archive", e.to_string()))?;
        if archived {
            Ok(())
        } else {
            Err(MessagingError::message_not_found(msg_id.to_string()))
        }
    }

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError> {
        let row: Option<PgmqMetricsRow> =
            sqlx::query_as("SELECT queue_length, oldest_msg_age_sec FROM pgmq.metrics($1)")
                .bind(queue_name)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| MessagingError::queue_operation(queue_name, "metrics", e.to_string()))?;

        let Some(row) = row else {
            return Err(MessagingError::queue_not_found(queue_name));
        };
        let mut stats = QueueStats::new(
            queue_name,
            u64::try_from(row.queue_length.unwrap_or(0)).unwrap_or(0),
        );
        if let Some(age) = row.oldest_msg_age_sec.and_then(|s| u64::try_from(s).ok()) {
            stats = stats.with_oldest_message_age(Duration::from_secs(age));
        }
        Ok(stats)
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(false);
        }
        let (one,): (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(one == 1)
    }

    async fn close(&self) -> Result<(), MessagingError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "pgmq"
    }
}
