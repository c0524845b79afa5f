//! # Messaging Service Types
//!
//! Identifiers, received-message wrapper and queue statistics shared by the
//! queue providers.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Identifier assigned to a message by the provider (pgmq `msg_id`, in-memory counter)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for MessageId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Handle used to ack, delay or archive a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(pub String);

impl ReceiptHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric form used by pgmq
    pub fn as_i64(&self) -> Option<i64> {
        self.0.parse().ok()
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ReceiptHandle {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl From<u64> for ReceiptHandle {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for ReceiptHandle {
    fn from(handle: &str) -> Self {
        Self(handle.to_string())
    }
}

/// A message received from a queue with its delivery metadata
#[derive(Debug, Clone)]
pub struct QueuedMessage<T> {
    pub receipt_handle: ReceiptHandle,

    pub message: T,

    /// Deliveries so far, including this one
    pub receive_count: u32,

    pub enqueued_at: DateTime<Utc>,
}

impl<T> QueuedMessage<T> {
    pub fn new(
        receipt_handle: ReceiptHandle,
        message: T,
        receive_count: u32,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            receipt_handle,
            message,
            receive_count,
            enqueued_at,
        }
    }
}

/// Queue statistics for monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct QueueStats {
    pub queue_name: String,

    /// Messages in the queue, visible and in flight
    pub message_count: u64,

    /// Messages currently invisible to consumers, when the provider tracks it
    pub in_flight_count: Option<u64>,

    /// Messages moved to the archive (dead-lettered or skipped), when tracked
    pub archived_count: Option<u64>,

    pub oldest_message_age: Option<Duration>,
}

impl QueueStats {
    pub fn new(queue_name: impl Into<String>, message_count: u64) -> Self {
        Self {
            queue_name: queue_name.into(),
            message_count,
            in_flight_count: None,
            archived_count: None,
            oldest_message_age: None,
        }
    }

    pub fn with_in_flight_count(mut self, count: u64) -> Self {
        self.in_flight_count = Some(count);
        self
    }

    pub fn with_archived_count(mut self, count: u64) -> Self {
        self.archived_count = Some(count);
        self
    }

    pub fn with_oldest_message_age(mut self, age: Duration) -> Self {
        self.oldest_message_age = Some(age);
        self
    }
}

/// Startup verification result for the configured queues
#[derive(Debug, Clone, Default)]
pub struct QueueHealthReport {
    pub healthy: Vec<String>,
    pub missing: Vec<String>,
}

impl QueueHealthReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_healthy(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn add_healthy(&mut self, queue_name: impl Into<String>) {
        self.healthy.push(queue_name.into());
    }

    pub fn add_missing(&mut self, queue_name: impl Into<String>) {
        self.missing.push(queue_name.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_handle_as_i64() {
        assert_eq!(ReceiptHandle::from(456_i64).as_i64(), Some(456));
        assert_eq!(ReceiptHandle::from("abc").as_i64(), None);
    }

    #[test]
    fn test_queue_health_report() {
        let mut report = QueueHealthReport::new();
        report.add_healthy("critical");
        assert!(report.is_healthy());

        report.add_missing("default");
        assert!(!report.is_healthy());
    }
}
