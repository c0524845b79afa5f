//! Task envelope carried on the queue and the typed payloads inside it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::errors::TaskError;

/// Wire format of every queued task
///
/// ```json
/// {"task_type":"task:send_verify_email","payload":{"user_id":7},"max_attempts":5,"enqueued_at":"..."}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_type: String,
    pub payload: serde_json::Value,
    pub max_attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl TaskEnvelope {
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value, max_attempts: u32) -> Self {
        Self {
            task_type: task_type.into(),
            payload,
            max_attempts,
            enqueued_at: Utc::now(),
        }
    }

    /// Decode the payload; a mismatch is a permanent failure
    pub fn decode_payload<P: DeserializeOwned>(&self) -> Result<P, TaskError> {
        decode_payload(&self.payload)
    }
}

pub fn decode_payload<P: DeserializeOwned>(payload: &serde_json::Value) -> Result<P, TaskError> {
    P::deserialize(payload).map_err(TaskError::from)
}

/// Per-enqueue overrides; unset fields fall back to the distributor defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOptions {
    pub queue: Option<String>,
    pub max_attempts: Option<u32>,
    pub delay: Option<Duration>,
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = Some(queue.into());
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyEmailPayload {
    pub user_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmationPayload {
    pub payment_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = TaskEnvelope::new("task:send_verify_email", json!({"user_id": 7}), 5);
        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["task_type"], "task:send_verify_email");
        assert_eq!(value["payload"]["user_id"], 7);
        assert_eq!(value["max_attempts"], 5);
        assert!(value["enqueued_at"].is_string());
    }

    #[test]
    fn test_payload_mismatch_is_permanent() {
        let envelope = TaskEnvelope::new("task:send_verify_email", json!({"user": "seven"}), 5);

        let err = envelope.decode_payload::<VerifyEmailPayload>().unwrap_err();
        assert!(err.is_permanent());

        let ok: VerifyEmailPayload = decode_payload(&json!({"user_id": 3})).unwrap();
        assert_eq!(ok.user_id, 3);
    }

    #[test]
    fn test_options_builder() {
        let options = TaskOptions::new()
            .queue("critical")
            .max_attempts(2)
            .delay(Duration::from_secs(10));

        assert_eq!(options.queue.as_deref(), Some("critical"));
        assert_eq!(options.max_attempts, Some(2));
        assert_eq!(options.delay, Some(Duration::from_secs(10)));
        assert_eq!(TaskOptions::default().queue, None);
    }
}
