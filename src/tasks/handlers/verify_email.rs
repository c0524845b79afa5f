use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::info;
use uuid::Uuid;

use super::render_or_partial;
use crate::constants::{system::VERIFY_EMAIL_TTL_MINUTES, task_types};
use crate::database::CommerceStore;
use crate::models::NewVerifyEmail;
use crate::notifications::{MailSender, MailTemplate, OutgoingMail, TemplateRenderer, VerifyEmailContext};
use crate::tasks::envelope::{decode_payload, VerifyEmailPayload};
use crate::tasks::errors::TaskError;
use crate::tasks::handler::TaskHandler;

/// Issues a one-time verification code and mails the link to the user
pub struct VerifyEmailHandler<S: CommerceStore> {
    store: Arc<S>,
    renderer: Arc<dyn TemplateRenderer>,
    mailer: Arc<dyn MailSender>,
    verify_url_base: String,
}

impl<S: CommerceStore> VerifyEmailHandler<S> {
    pub fn new(
        store: Arc<S>,
        renderer: Arc<dyn TemplateRenderer>,
        mailer: Arc<dyn MailSender>,
        verify_url_base: impl Into<String>,
    ) -> Self {
        Self {
            store,
            renderer,
            mailer,
            verify_url_base: verify_url_base.into(),
        }
    }

    fn verify_url(&self, email_id: i64, secret_code: &str) -> String {
        format!(
            "{}?email_id={}&secret_code={}",
            self.verify_url_base, email_id, secret_code
        )
    }
}

#[async_trait]
impl<S: CommerceStore> TaskHandler for VerifyEmailHandler<S> {
    fn task_type(&self) -> &'static str {
        task_types::SEND_VERIFY_EMAIL
    }

    async fn handle(&self, payload: &serde_json::Value) -> Result<(), TaskError> {
        let VerifyEmailPayload { user_id } = decode_payload(payload)?;

        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| TaskError::skip_retry(format!("user {user_id} does not exist")))?;

        // A retried delivery resends the code issued by the earlier attempt
        let record = match self.store.find_live_verify_email(user.id).await? {
            Some(record) if record.email == user.email => record,
            _ => {
                self.store
                    .create_verify_email(&NewVerifyEmail {
                        user_id: user.id,
                        email: user.email.clone(),
                        secret_code: Uuid::new_v4().simple().to_string(),
                        expired_at: Utc::now() + Duration::minutes(VERIFY_EMAIL_TTL_MINUTES),
                    })
                    .await?
            }
        };

        let template = MailTemplate::VerifyEmail(VerifyEmailContext {
            full_name: user.full_name.clone(),
            username: user.username.clone(),
            verify_url: self.verify_url(record.id, &record.secret_code),
            expires_in_minutes: VERIFY_EMAIL_TTL_MINUTES,
        });
        let body = render_or_partial(self.renderer.as_ref(), &template);

        self.mailer
            .send(&OutgoingMail::new(template.subject(), body, vec![user.email]))
            .await?;

        info!(user_id = user_id, verify_email_id = record.id, "Verification email sent");
        Ok(())
    }
}
