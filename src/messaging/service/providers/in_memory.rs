//! # In-Memory Messaging Service
//!
//! Process-local queues with visibility timeouts, receive counts and a
//! per-queue archive, for tests and local development.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::messaging::service::traits::{MessagingService, QueueMessage};
use crate::messaging::service::types::{
    MessageId, QueueHealthReport, QueueStats, QueuedMessage, ReceiptHandle,
};
use crate::messaging::MessagingError;

#[derive(Debug, Clone)]
struct InMemoryQueuedMessage {
    id: u64,
    payload: Vec<u8>,
    enqueued_at: DateTime<Utc>,
    /// None = visible now
    visible_at: Option<DateTime<Utc>>,
    receive_count: u32,
}

/// A message removed from delivery by `archive_message`
#[derive(Debug, Clone)]
pub struct ArchivedMessage {
    pub message_id: u64,
    pub payload: Vec<u8>,
    pub receive_count: u32,
    pub archived_at: DateTime<Utc>,
}

impl ArchivedMessage {
    /// Decode the archived payload, e.g. to inspect a dead-lettered task
    pub fn decode<T: QueueMessage>(&self) -> Result<T, MessagingError> {
        T::from_bytes(&self.payload)
    }
}

#[derive(Debug, Default)]
struct InMemoryQueue {
    messages: VecDeque<InMemoryQueuedMessage>,
    archive: Vec<ArchivedMessage>,
    next_id: u64,
}

impl InMemoryQueue {
    fn position(&self, receipt_handle: &ReceiptHandle) -> Result<usize, MessagingError> {
        let message_id: u64 = receipt_handle
            .as_str()
            .parse()
            .map_err(|_| MessagingError::invalid_receipt_handle(receipt_handle.as_str()))?;
        self.messages
            .iter()
            .position(|m| m.id == message_id)
            .ok_or_else(|| MessagingError::message_not_found(message_id.to_string()))
    }
}

/// In-memory [`MessagingService`]
#[derive(Debug, Default)]
pub struct InMemoryMessagingService {
    queues: RwLock<HashMap<String, InMemoryQueue>>,
    fail_sends: AtomicBool,
    closed: AtomicBool,
}

fn to_chrono(duration: Duration) -> Result<chrono::Duration, MessagingError> {
    chrono::Duration::from_std(duration)
        .map_err(|e| MessagingError::configuration("in_memory", format!("duration out of range: {e}")))
}

impl InMemoryMessagingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with the given queues already present
    pub fn with_queues(queue_names: &[&str]) -> Self {
        let queues = queue_names
            .iter()
            .map(|name| (name.to_string(), InMemoryQueue::default()))
            .collect();
        Self {
            queues: RwLock::new(queues),
            ..Self::default()
        }
    }

    /// Make sends fail as if the backend were unreachable
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Release);
    }

    /// Messages still in the queue, visible or in flight
    pub async fn queue_length(&self, queue_name: &str) -> usize {
        self.queues
            .read()
            .await
            .get(queue_name)
            .map_or(0, |q| q.messages.len())
    }

    pub async fn archived_messages(&self, queue_name: &str) -> Vec<ArchivedMessage> {
        self.queues
            .read()
            .await
            .get(queue_name)
            .map(|q| q.archive.clone())
            .unwrap_or_default()
    }

    /// Make every in-flight message visible again (simulates visibility expiry)
    pub async fn expire_visibility(&self, queue_name: &str) {
        if let Some(queue) = self.queues.write().await.get_mut(queue_name) {
            for message in queue.messages.iter_mut() {
                message.visible_at = None;
            }
        }
    }

    fn ensure_open(&self) -> Result<(), MessagingError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(MessagingError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingService for InMemoryMessagingService {
    async fn ensure_queue(&self, queue_name: &str) -> Result<(), MessagingError> {
        self.queues
            .write()
            .await
            .entry(queue_name.to_string())
            .or_default();
        Ok(())
    }

    async fn verify_queues(
        &self,
        queue_names: &[String],
    ) -> Result<QueueHealthReport, MessagingError> {
        let queues = self.queues.read().await;
        let mut report = QueueHealthReport::new();
        for name in queue_names {
            if queues.contains_key(name) {
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
        if self.fail_sends.load(Ordering::Acquire) {
            return Err(MessagingError::queue_operation(
                queue_name,
                "send",
                "injected send failure",
            ));
        }
        let payload = message.to_bytes()?;
        let now = Utc::now();
        let visible_at = if delay.is_zero() {
            None
        } else {
            Some(now + to_chrono(delay)?)
        };

        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        queue.next_id += 1;
        let id = queue.next_id;
        queue.messages.push_back(InMemoryQueuedMessage {
            id,
            payload,
            enqueued_at: now,
            visible_at,
            receive_count: 0,
        });

        Ok(MessageId::from(id))
    }

    async fn receive_messages<T: QueueMessage>(
        &self,
        queue_name: &str,
        max_messages: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueuedMessage<T>>, MessagingError> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Utc::now();
        let visible_until = now + to_chrono(visibility_timeout)?;
        let mut received = Vec::new();

        for msg in queue.messages.iter_mut() {
            if received.len() >= max_messages {
                break;
            }
            if msg.visible_at.is_some_and(|vt| vt > now) {
                continue;
            }

            let decoded = T::from_bytes(&msg.payload)?;
            msg.visible_at = Some(visible_until);
            msg.receive_count += 1;
            received.push(QueuedMessage::new(
                ReceiptHandle::from(msg.id),
                decoded,
                msg.receive_count,
                msg.enqueued_at,
            ));
        }

        Ok(received)
    }

    async fn ack_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        let pos = queue.position(receipt_handle)?;
        queue.messages.remove(pos);
        Ok(())
    }

    async fn retry_later(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
        delay: Duration,
    ) -> Result<(), MessagingError> {
        let visible_at = Utc::now() + to_chrono(delay)?;
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        let pos = queue.position(receipt_handle)?;
        queue.messages[pos].visible_at = Some(visible_at);
        Ok(())
    }

    async fn archive_message(
        &self,
        queue_name: &str,
        receipt_handle: &ReceiptHandle,
    ) -> Result<(), MessagingError> {
        let mut queues = self.queues.write().await;
        let queue = queues
            .get_mut(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;
        let pos = queue.position(receipt_handle)?;
        if let Some(message) = queue.messages.remove(pos) {
            queue.archive.push(ArchivedMessage {
                message_id: message.id,
                payload: message.payload,
                receive_count: message.receive_count,
                archived_at: Utc::now(),
            });
        }
        Ok(())
    }

    async fn queue_stats(&self, queue_name: &str) -> Result<QueueStats, MessagingError> {
        let queues = self.queues.read().await;
        let queue = queues
            .get(queue_name)
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))?;

        let now = Utc::now();
        let in_flight = queue
            .messages
            .iter()
            .filter(|m| m.receive_count > 0 && m.visible_at.is_some_and(|vt| vt > now))
            .count() as u64;

        let mut stats = QueueStats::new(queue_name, queue.messages.len() as u64)
            .with_in_flight_count(in_flight)
            .with_archived_count(queue.archive.len() as u64);
        if let Some(oldest) = queue.messages.iter().map(|m| m.enqueued_at).min() {
            if let Ok(age) = (now - oldest).to_std() {
                stats = stats.with_oldest_message_age(age);
            }
        }
        Ok(stats)
    }

    async fn health_check(&self) -> Result<bool, MessagingError> {
        Ok(!self.closed.load(Ordering::Acquire))
    }

    async fn close(&self) -> Result<(), MessagingError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const QUEUE: &str = "default";
    const VT: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_received_messages_are_hidden_until_visibility_expires() {
        let service = InMemoryMessagingService::with_queues(&[QUEUE]);
        service.send_message(QUEUE, &json!({"user_id": 1})).await.unwrap();

        let first = service
            .receive_messages::<serde_json::Value>(QUEUE, 10, VT)
            .await
            .unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].receive_count, 1);

        let hidden = service
            .receive_messages::<serde_json::Value>(QUEUE, 10, VT)
            .await
            .unwrap();
        assert!(hidden.is_empty());

        service.expire_visibility(QUEUE).await;
        let again = service
            .receive_messages::<serde_json::Value>(QUEUE, 10, VT)
            .await
            .unwrap();
        assert_eq!(again[0].receive_count, 2);
    }

    #[tokio::test]
    async fn test_delayed_send_is_invisible() {
        let service = InMemoryMessagingService::with_queues(&[QUEUE]);
        service
            .send_delayed(QUEUE, &json!({"n": 1}), Duration::from_secs(60))
            .await
            .unwrap();

        let received = service
            .receive_messages::<serde_json::Value>(QUEUE, 10, VT)
            .await
            .unwrap();
        assert!(received.is_empty());
        assert_eq!(service.queue_length(QUEUE).await, 1);
    }

    #[tokio::test]
    async fn test_ack_and_archive_remove_messages() {
        let service = InMemoryMessagingService::with_queues(&[QUEUE]);
        service.send_message(QUEUE, &json!({"n": 1})).await.unwrap();
        service.send_message(QUEUE, &json!({"n": 2})).await.unwrap();

        let received = service
            .receive_messages::<serde_json::Value>(QUEUE, 10, VT)
            .await
            .unwrap();
        service
            .ack_message(QUEUE, &received[0].receipt_handle)
            .await
            .unwrap();
        service
            .archive_message(QUEUE, &received[1].receipt_handle)
            .await
            .unwrap();

        assert_eq!(service.queue_length(QUEUE).await, 0);
        let archived = service.archived_messages(QUEUE).await;
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].decode::<serde_json::Value>().unwrap(), json!({"n": 2}));

        let stats = service.queue_stats(QUEUE).await.unwrap();
        assert_eq!(stats.message_count, 0);
        assert_eq!(stats.archived_count, Some(1));
    }

    #[tokio::test]
    async fn test_unknown_queue_and_closed_service() {
        let service = InMemoryMessagingService::new();
        let err = service.send_message("missing", &json!({})).await.unwrap_err();
        assert!(matches!(err, MessagingError::QueueNotFound { .. }));

        service.ensure_queue(QUEUE).await.unwrap();
        service.close().await.unwrap();
        let err = service.send_message(QUEUE, &json!({})).await.unwrap_err();
        assert!(matches!(err, MessagingError::Closed));
        assert!(!service.health_check().await.unwrap());
    }
}
