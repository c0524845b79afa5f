//! # Task Processor
//!
//! Worker pool that pulls envelopes from the configured queues, dispatches them
//! to the registered [`TaskHandler`](super::TaskHandler)s and settles every
//! message:
//!
//! | Outcome | Queue action | Disposition |
//! |---|---|---|
//! | handler ok | delete | `Completed` |
//! | retryable failure, attempts left | hide for backoff delay | `Retrying` |
//! | retryable failure, attempts exhausted | archive | `DeadLettered` |
//! | permanent failure | archive | `Skipped` |
//! | malformed envelope / unknown type | archive | `Skipped` |
//!
//! Queues are polled in the configured order, so a non-empty higher-priority
//! queue is drained before a lower one is read.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::envelope::TaskEnvelope;
use super::errors::{TaskDisposition, TaskError};
use super::handler::HandlerRegistry;
use crate::config::{BackoffConfig, QueueConfig};
use crate::logging::log_task_operation;
use crate::messaging::{MessagingError, MessagingResult, MessagingService, QueuedMessage, ReceiptHandle};
use crate::state_machine::TaskState;

/// Pause after a failed poll before the worker tries again
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Highest priority first
    pub queues: Vec<String>,
    pub worker_count: usize,
    pub batch_size: usize,
    pub visibility_timeout: Duration,
    pub polling_interval: Duration,
    /// Used when an envelope carries `max_attempts = 0`
    pub default_max_attempts: u32,
    pub backoff: BackoffConfig,
}

impl ProcessorConfig {
    pub fn from_config(queue: &QueueConfig, backoff: &BackoffConfig) -> Self {
        Self {
            queues: queue.queues.clone(),
            worker_count: queue.worker_count.max(1),
            batch_size: queue.batch_size.max(1),
            visibility_timeout: queue.visibility_timeout(),
            polling_interval: queue.polling_interval(),
            default_max_attempts: queue.max_attempts.max(1),
            backoff: backoff.clone(),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default(), &BackoffConfig::default())
    }
}

/// One settled message
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedTask {
    pub queue: String,
    pub receipt_handle: ReceiptHandle,
    /// `None` when the envelope could not be decoded
    pub task_type: Option<String>,
    pub receive_count: u32,
    pub disposition: TaskDisposition,
}

pub struct TaskProcessor<M: MessagingService> {
    messaging: Arc<M>,
    registry: Arc<HandlerRegistry>,
    config: ProcessorConfig,
    shutdown_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<M: MessagingService> std::fmt::Debug for TaskProcessor<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskProcessor")
            .field("provider", &self.messaging.provider_name())
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl<M: MessagingService> TaskProcessor<M> {
    pub fn new(messaging: Arc<M>, registry: HandlerRegistry, config: ProcessorConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            messaging,
            registry: Arc::new(registry),
            config,
            shutdown_tx,
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        !self.workers.lock().await.is_empty()
    }

    /// Spawn `worker_count` polling workers
    pub async fn start(self: &Arc<Self>) -> MessagingResult<()> {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            return Err(MessagingError::configuration(
                "task_processor",
                "processor is already running",
            ));
        }

        self.shutdown_tx.send_replace(false);
        for worker_id in 0..self.config.worker_count {
            let processor = Arc::clone(self);
            let shutdown_rx = self.shutdown_tx.subscribe();
            workers.push(tokio::spawn(async move {
                processor.worker_loop(worker_id, shutdown_rx).await;
            }));
        }

        info!(
            workers = self.config.worker_count,
            queues = ?self.config.queues,
            task_types = ?self.registry.task_types(),
            "Task processor started"
        );
        Ok(())
    }

    /// Signal workers to stop after their current message and wait up to `timeout`
    ///
    /// Workers still busy when the timeout expires are aborted; their messages
    /// reappear once the visibility timeout lapses.
    pub async fn stop(&self, timeout: Duration) {
        self.shutdown_tx.send_replace(true);
        let handles: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        if handles.is_empty() {
            return;
        }

        let deadline = tokio::time::Instant::now() + timeout;
        for mut handle in handles {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Task worker ended abnormally"),
                Err(_) => {
                    warn!("Task worker did not stop within timeout, aborting");
                    handle.abort();
                }
            }
        }
        info!("Task processor stopped");
    }

    async fn worker_loop(self: Arc<Self>, worker_id: usize, mut shutdown_rx: watch::Receiver<bool>) {
        debug!(worker_id = worker_id, "Task worker started");

        while !*shutdown_rx.borrow() {
            let wait = match self.process_next_batch().await {
                Ok(processed) if !processed.is_empty() => continue,
                Ok(_) => self.config.polling_interval,
                Err(e) => {
                    error!(worker_id = worker_id, error = %e, "Task poll failed");
                    ERROR_BACKOFF.max(self.config.polling_interval)
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        debug!(worker_id = worker_id, "Task worker stopped");
    }

    /// Receive and settle one batch from the highest-priority non-empty queue
    pub async fn process_next_batch(&self) -> MessagingResult<Vec<ProcessedTask>> {
        for queue in &self.config.queues {
            let messages = self
                .messaging
                .receive_messages::<serde_json::Value>(
                    queue,
                    self.config.batch_size,
                    self.config.visibility_timeout,
                )
                .await?;
            if messages.is_empty() {
                continue;
            }

            let mut processed = Vec::with_capacity(messages.len());
            for message in messages {
                let handle = message.receipt_handle.clone();
                match self.process_message(queue, message).await {
                    Ok(task) => processed.push(task),
                    // Left unsettled; the queue redelivers it after the visibility timeout
                    Err(e) => error!(
                        queue = %queue,
                        receipt_handle = %handle,
                        error = %e,
                        "Failed to settle task message"
                    ),
                }
            }
            return Ok(processed);
        }
        Ok(Vec::new())
    }

    async fn process_message(
        &self,
        queue: &str,
        message: QueuedMessage<serde_json::Value>,
    ) -> MessagingResult<ProcessedTask> {
        let QueuedMessage {
            receipt_handle,
            message: raw,
            receive_count,
            ..
        } = message;

        let envelope: TaskEnvelope = match serde_json::from_value(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                let reason = format!("malformed task envelope: {e}");
                self.messaging.archive_message(queue, &receipt_handle).await?;
                log_task_operation(
                    "process",
                    "unknown",
                    queue,
                    Some(receipt_handle.as_str()),
                    TaskState::Skipped.to_string().as_str(),
                    Some(&reason),
                );
                return Ok(ProcessedTask {
                    queue: queue.to_string(),
                    receipt_handle,
                    task_type: None,
                    receive_count,
                    disposition: TaskDisposition::Skipped { reason },
                });
            }
        };

        let disposition = self
            .dispatch(queue, &receipt_handle, receive_count, &envelope)
            .await?;

        let details = match &disposition {
            TaskDisposition::Completed => None,
            TaskDisposition::Retrying { delay, .. } => Some(format!("retry in {delay:?}")),
            TaskDisposition::DeadLettered { attempts } => {
                Some(format!("gave up after {attempts} attempts"))
            }
            TaskDisposition::Skipped { reason } => Some(reason.clone()),
        };
        log_task_operation(
            "process",
            &envelope.task_type,
            queue,
            Some(receipt_handle.as_str()),
            disposition.state().to_string().as_str(),
            details.as_deref(),
        );

        Ok(ProcessedTask {
            queue: queue.to_string(),
            receipt_handle,
            task_type: Some(envelope.task_type),
            receive_count,
            disposition,
        })
    }

    async fn dispatch(
        &self,
        queue: &str,
        receipt_handle: &ReceiptHandle,
        receive_count: u32,
        envelope: &TaskEnvelope,
    ) -> MessagingResult<TaskDisposition> {
        let Some(handler) = self.registry.get(&envelope.task_type) else {
            self.messaging.archive_message(queue, receipt_handle).await?;
            return Ok(TaskDisposition::Skipped {
                reason: format!("no handler registered for {}", envelope.task_type),
            });
        };

        debug!(
            task_type = %envelope.task_type,
            queue = %queue,
            attempt = receive_count,
            "Task in flight"
        );

        match handler.handle(&envelope.payload).await {
            Ok(()) => {
                self.messaging.ack_message(queue, receipt_handle).await?;
                Ok(TaskDisposition::Completed)
            }
            Err(TaskError::SkipRetry(reason)) => {
                self.messaging.archive_message(queue, receipt_handle).await?;
                Ok(TaskDisposition::Skipped { reason })
            }
            Err(TaskError::Retry(reason)) => {
                let max_attempts = if envelope.max_attempts == 0 {
                    self.config.default_max_attempts
                } else {
                    envelope.max_attempts
                };

                if receive_count >= max_attempts {
                    warn!(
                        task_type = %envelope.task_type,
                        attempts = receive_count,
                        error = %reason,
                        "Task exhausted its retries"
                    );
                    self.messaging.archive_message(queue, receipt_handle).await?;
                    return Ok(TaskDisposition::DeadLettered {
                        attempts: receive_count,
                    });
                }

                let delay = self.config.backoff.delay_for_attempt(receive_count);
                warn!(
                    task_type = %envelope.task_type,
                    attempt = receive_count,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "Task failed, retrying later"
                );
                self.messaging
                    .retry_later(queue, receipt_handle, delay)
                    .await?;
                Ok(TaskDisposition::Retrying {
                    attempt: receive_count,
                    delay,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::queues;
    use crate::messaging::InMemoryMessagingService;
    use crate::tasks::{TaskHandler, TaskOptions};
    use crate::tasks::distributor::TaskDistributor;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl TaskHandler for Flaky {
        fn task_type(&self) -> &'static str {
            "task:flaky"
        }

        async fn handle(&self, _payload: &serde_json::Value) -> Result<(), TaskError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                Err(TaskError::retry(format!("call {call} failed")))
            } else {
                Ok(())
            }
        }
    }

    fn fast_config() -> ProcessorConfig {
        ProcessorConfig {
            backoff: BackoffConfig {
                base_delay_ms: 0,
                max_delay_ms: 0,
            },
            polling_interval: Duration::from_millis(10),
            ..ProcessorConfig::default()
        }
    }

    fn setup(
        fail_first: u32,
    ) -> (
        Arc<InMemoryMessagingService>,
        TaskDistributor<InMemoryMessagingService>,
        Arc<Flaky>,
        Arc<TaskProcessor<InMemoryMessagingService>>,
    ) {
        let messaging = Arc::new(InMemoryMessagingService::with_queues(&[
            queues::CRITICAL,
            queues::DEFAULT,
        ]));
        let distributor = TaskDistributor::new(messaging.clone(), &QueueConfig::default());
        let handler = Arc::new(Flaky {
            calls: AtomicU32::new(0),
            fail_first,
        });
        let mut registry = HandlerRegistry::new();
        registry.register(handler.clone());
        let processor = Arc::new(TaskProcessor::new(messaging.clone(), registry, fast_config()));
        (messaging, distributor, handler, processor)
    }

    #[tokio::test]
    async fn test_retry_then_complete() {
        let (messaging, distributor, handler, processor) = setup(1);
        distributor
            .enqueue("task:flaky", &serde_json::json!({}), TaskOptions::new().max_attempts(3))
            .await
            .unwrap();

        let first = processor.process_next_batch().await.unwrap();
        assert!(matches!(first[0].disposition, TaskDisposition::Retrying { attempt: 1, .. }));

        let second = processor.process_next_batch().await.unwrap();
        assert_eq!(second[0].disposition, TaskDisposition::Completed);
        assert_eq!(second[0].receive_count, 2);

        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(messaging.queue_length(queues::DEFAULT).await, 0);
        assert!(messaging.archived_messages(queues::DEFAULT).await.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_dead_lettered() {
        let (messaging, distributor, handler, processor) = setup(u32::MAX);
        distributor
            .enqueue("task:flaky", &serde_json::json!({}), TaskOptions::new().max_attempts(2))
            .await
            .unwrap();

        processor.process_next_batch().await.unwrap();
        let last = processor.process_next_batch().await.unwrap();

        assert_eq!(last[0].disposition, TaskDisposition::DeadLettered { attempts: 2 });
        assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
        assert_eq!(messaging.archived_messages(queues::DEFAULT).await.len(), 1);
        assert!(processor.process_next_batch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_type_and_malformed_envelope_are_skipped() {
        let (messaging, distributor, _handler, processor) = setup(0);
        distributor
            .enqueue("task:unregistered", &serde_json::json!({}), TaskOptions::new())
            .await
            .unwrap();
        messaging
            .send_message(queues::DEFAULT, &serde_json::json!({"not": "an envelope"}))
            .await
            .unwrap();

        let processed = processor.process_next_batch().await.unwrap();
        assert_eq!(processed.len(), 2);
        for task in &processed {
            assert!(matches!(task.disposition, TaskDisposition::Skipped { .. }));
        }
        assert!(processed.iter().any(|t| t.task_type.is_none()));
        assert_eq!(messaging.archived_messages(queues::DEFAULT).await.len(), 2);
    }

    #[tokio::test]
    async fn test_critical_queue_is_drained_first() {
        let (_messaging, distributor, _handler, processor) = setup(0);
        distributor
            .enqueue("task:flaky", &serde_json::json!({"n": 1}), TaskOptions::new())
            .await
            .unwrap();
        distributor
            .enqueue(
                "task:flaky",
                &serde_json::json!({"n": 2}),
                TaskOptions::new().queue(queues::CRITICAL),
            )
            .await
            .unwrap();

        let first = processor.process_next_batch().await.unwrap();
        assert_eq!(first[0].queue, queues::CRITICAL);
        let second = processor.process_next_batch().await.unwrap();
        assert_eq!(second[0].queue, queues::DEFAULT);
    }

    #[tokio::test]
    async fn test_workers_drain_queue_and_stop() {
        let (messaging, distributor, handler, processor) = setup(0);
        for n in 0..5 {
            distributor
                .enqueue("task:flaky", &serde_json::json!({ "n": n }), TaskOptions::new())
                .await
                .unwrap();
        }

        processor.start().await.unwrap();
        assert!(processor.start().await.is_err());

        for _ in 0..200 {
            if handler.calls.load(Ordering::SeqCst) >= 5 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        processor.stop(Duration::from_secs(5)).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 5);
        assert_eq!(messaging.queue_length(queues::DEFAULT).await, 0);
        assert!(!processor.is_running().await);
    }
}
