//! # Task Distributor
//!
//! Wraps each task in a [`TaskEnvelope`] and enqueues it on the durable queue.
//! Once [`TaskDistributor::shutdown`] has run, every enqueue fails with
//! [`MessagingError::Closed`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use super::envelope::{OrderConfirmationPayload, TaskEnvelope, TaskOptions, VerifyEmailPayload};
use crate::config::QueueConfig;
use crate::constants::{queues, task_types};
use crate::logging::log_task_operation;
use crate::messaging::{MessageId, MessagingError, MessagingService};

/// Receipt for an accepted enqueue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueuedTask {
    pub message_id: MessageId,
    pub queue: String,
    pub task_type: String,
    pub max_attempts: u32,
}

/// Object-safe publishing seam used by the checkout workflow
#[async_trait]
pub trait TaskPublisher: Send + Sync + 'static {
    async fn publish_order_confirmation(
        &self,
        payment_id: i64,
    ) -> Result<EnqueuedTask, MessagingError>;

    async fn publish_verify_email(&self, user_id: i64) -> Result<EnqueuedTask, MessagingError>;
}

#[derive(Debug)]
pub struct TaskDistributor<M: MessagingService> {
    messaging: Arc<M>,
    default_queue: String,
    default_max_attempts: u32,
    shut_down: AtomicBool,
}

impl<M: MessagingService> TaskDistributor<M> {
    pub fn new(messaging: Arc<M>, config: &QueueConfig) -> Self {
        Self {
            messaging,
            default_queue: config.default_queue.clone(),
            default_max_attempts: config.max_attempts.max(1),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn messaging(&self) -> &Arc<M> {
        &self.messaging
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Enqueue `payload` as a task of `task_type`
    ///
    /// Returns once the queue has durably accepted the message.
    pub async fn enqueue<P: Serialize + ?Sized + Sync>(
        &self,
        task_type: &str,
        payload: &P,
        options: TaskOptions,
    ) -> Result<EnqueuedTask, MessagingError> {
        if self.is_shut_down() {
            return Err(MessagingError::Closed);
        }

        let payload = serde_json::to_value(payload)
            .map_err(|e| MessagingError::message_serialization(e.to_string()))?;
        let max_attempts = options
            .max_attempts
            .unwrap_or(self.default_max_attempts)
            .max(1);
        let queue = options
            .queue
            .unwrap_or_else(|| self.default_queue.clone());
        let envelope = TaskEnvelope::new(task_type, payload, max_attempts);

        let message_id = self
            .messaging
            .send_delayed(&queue, &envelope, options.delay.unwrap_or(Duration::ZERO))
            .await
            .inspect_err(|e| {
                warn!(task_type = %task_type, queue = %queue, error = %e, "Failed to enqueue task");
            })?;

        log_task_operation(
            "enqueue",
            task_type,
            &queue,
            Some(message_id.as_str()),
            "enqueued",
            None,
        );

        Ok(EnqueuedTask {
            message_id,
            queue,
            task_type: task_type.to_string(),
            max_attempts,
        })
    }

    pub async fn send_verify_email(
        &self,
        payload: VerifyEmailPayload,
        options: TaskOptions,
    ) -> Result<EnqueuedTask, MessagingError> {
        self.enqueue(task_types::SEND_VERIFY_EMAIL, &payload, options)
            .await
    }

    pub async fn send_order_confirmation(
        &self,
        payload: OrderConfirmationPayload,
        options: TaskOptions,
    ) -> Result<EnqueuedTask, MessagingError> {
        self.enqueue(task_types::SEND_ORDER_CONFIRMATION, &payload, options)
            .await
    }

    /// Stop accepting tasks and close the publishing connection (idempotent)
    pub async fn shutdown(&self) -> Result<(), MessagingError> {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!(provider = self.messaging.provider_name(), "Task distributor shutting down");
        self.messaging.close().await
    }
}

#[async_trait]
impl<M: MessagingService> TaskPublisher for TaskDistributor<M> {
    async fn publish_order_confirmation(
        &self,
        payment_id: i64,
    ) -> Result<EnqueuedTask, MessagingError> {
        self.send_order_confirmation(
            OrderConfirmationPayload { payment_id },
            TaskOptions::new().queue(queues::CRITICAL),
        )
        .await
    }

    async fn publish_verify_email(&self, user_id: i64) -> Result<EnqueuedTask, MessagingError> {
        self.send_verify_email(VerifyEmailPayload { user_id }, TaskOptions::new())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::InMemoryMessagingService;

    fn distributor() -> (Arc<InMemoryMessagingService>, TaskDistributor<InMemoryMessagingService>) {
        let messaging = Arc::new(InMemoryMessagingService::with_queues(&[
            queues::CRITICAL,
            queues::DEFAULT,
        ]));
        let distributor = TaskDistributor::new(messaging.clone(), &QueueConfig::default());
        (messaging, distributor)
    }

    #[tokio::test]
    async fn test_enqueue_uses_defaults() {
        let (messaging, distributor) = distributor();

        let task = distributor
            .send_verify_email(VerifyEmailPayload { user_id: 7 }, TaskOptions::new())
            .await
            .unwrap();

        assert_eq!(task.queue, QueueConfig::default().default_queue);
        assert_eq!(task.task_type, task_types::SEND_VERIFY_EMAIL);
        assert_eq!(task.max_attempts, QueueConfig::default().max_attempts);
        assert_eq!(messaging.queue_length(&task.queue).await, 1);
    }

    #[tokio::test]
    async fn test_options_override_queue_and_attempts() {
        let (messaging, distributor) = distributor();

        let task = distributor
            .send_order_confirmation(
                OrderConfirmationPayload { payment_id: 3 },
                TaskOptions::new().queue(queues::CRITICAL).max_attempts(2),
            )
            .await
            .unwrap();

        assert_eq!(task.queue, queues::CRITICAL);
        assert_eq!(task.max_attempts, 2);

        let received = messaging
            .receive_messages::<TaskEnvelope>(queues::CRITICAL, 10, Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].message.payload["payment_id"], 3);
        assert_eq!(received[0].message.max_attempts, 2);
    }

    #[tokio::test]
    async fn test_publisher_routes_by_task_type() {
        let (messaging, distributor) = distributor();

        let confirmation = distributor.publish_order_confirmation(5).await.unwrap();
        let verify = distributor.publish_verify_email(6).await.unwrap();

        assert_eq!(confirmation.queue, queues::CRITICAL);
        assert_eq!(verify.queue, QueueConfig::default().default_queue);
        assert_eq!(messaging.queue_length(queues::CRITICAL).await, 1);
        assert_eq!(messaging.queue_length(queues::DEFAULT).await, 1);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_fails() {
        let (_messaging, distributor) = distributor();

        distributor.shutdown().await.unwrap();
        distributor.shutdown().await.unwrap();

        let err = distributor
            .publish_verify_email(1)
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::Closed));
    }

    #[tokio::test]
    async fn test_unknown_queue_is_reported() {
        let (_messaging, distributor) = distributor();

        let err = distributor
            .enqueue("task:x", &serde_json::json!({}), TaskOptions::new().queue("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, MessagingError::QueueNotFound { .. }), "got {err:?}");
    }
}
