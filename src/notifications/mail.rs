//! # Mail Delivery
//!
//! [`MailSender`] is the delivery channel used by the task handlers.
//! [`HttpMailSender`] posts each mail as JSON to an HTTP mail relay;
//! [`RecordingMailSender`] keeps sent mail in memory for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::prelude::*;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::MailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail configuration error: {0}")]
    Config(String),

    #[error("Mail relay unavailable: {0}")]
    Unavailable(String),

    #[error("Mail rejected by relay: {0}")]
    Rejected(String),

    #[error("Mail transport error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// One email to deliver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMail {
    pub subject: String,
    /// HTML body
    pub body: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub attachments: Vec<Attachment>,
}

impl OutgoingMail {
    pub fn new(subject: impl Into<String>, body: impl Into<String>, to: Vec<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            to,
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait MailSender: Send + Sync + 'static {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError>;
}

#[derive(Debug, Serialize)]
struct RelayAddress<'a> {
    name: &'a str,
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct RelayAttachment<'a> {
    filename: &'a str,
    content_type: &'a str,
    content_base64: String,
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    from: RelayAddress<'a>,
    subject: &'a str,
    html: &'a str,
    to: &'a [String],
    cc: &'a [String],
    bcc: &'a [String],
    attachments: Vec<RelayAttachment<'a>>,
}

/// Delivers mail through an HTTP relay (`POST {api_url}` with a JSON body)
#[derive(Debug, Clone)]
pub struct HttpMailSender {
    client: Client,
    config: MailConfig,
}

impl HttpMailSender {
    pub fn new(config: MailConfig) -> Result<Self, MailError> {
        if config.api_url.trim().is_empty() {
            return Err(MailError::Config("mail.api_url is not configured".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    fn is_retryable_status(status: reqwest::StatusCode) -> bool {
        status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

#[async_trait]
impl MailSender for HttpMailSender {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        let request = RelayRequest {
            from: RelayAddress {
                name: &self.config.sender_name,
                email: &self.config.sender_address,
            },
            subject: &mail.subject,
            html: &mail.body,
            to: &mail.to,
            cc: &mail.cc,
            bcc: &mail.bcc,
            attachments: mail
                .attachments
                .iter()
                .map(|a| RelayAttachment {
                    filename: &a.filename,
                    content_type: &a.content_type,
                    content_base64: BASE64_STANDARD.encode(&a.content),
                })
                .collect(),
        };

        let mut builder = self.client.post(&self.config.api_url).json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                MailError::Unavailable(e.to_string())
            } else {
                MailError::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(subject = %mail.subject, recipients = mail.to.len(), "Mail accepted by relay");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let detail = format!("HTTP {} - {}", status, body.chars().take(200).collect::<String>());
        warn!(status = %status, "Mail relay refused message");
        if Self::is_retryable_status(status) {
            Err(MailError::Unavailable(detail))
        } else {
            Err(MailError::Rejected(detail))
        }
    }
}

/// Keeps every sent mail; can be switched to fail
#[derive(Debug, Default)]
pub struct RecordingMailSender {
    sent: Mutex<Vec<OutgoingMail>>,
    attempts: Mutex<u32>,
    failing: AtomicBool,
}

impl RecordingMailSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().clone()
    }

    /// Calls to `send`, successful or not
    pub fn attempts(&self) -> u32 {
        *self.attempts.lock()
    }
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        *self.attempts.lock() += 1;
        if self.failing.load(Ordering::Acquire) {
            return Err(MailError::Unavailable("recording sender set to fail".to_string()));
        }
        self.sent.lock().push(mail.clone());
        Ok(())
    }
}
