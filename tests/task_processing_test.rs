//! Task distribution and processing through a fully wired in-memory context

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{money, TaskHarness, VERIFY_URL_BASE};
use serde_json::json;
use storefront_core::checkout::CheckoutRequest;
use storefront_core::constants::{queues, system, task_types};
use storefront_core::error::CommerceError;
use storefront_core::notifications::{MailTemplate, RenderError, TemplateRenderer};
use storefront_core::tasks::{
    OrderConfirmationPayload, ProcessedTask, TaskDisposition, TaskOptions, VerifyEmailPayload,
};

async fn next_task(harness: &TaskHarness) -> ProcessedTask {
    let mut batch = harness.processor.process_next_batch().await.unwrap();
    assert_eq!(batch.len(), 1, "expected exactly one task, got {batch:?}");
    batch.remove(0)
}

#[tokio::test]
async fn test_verify_email_creates_code_and_sends_link() {
    let harness = TaskHarness::new(3).await;
    let user = harness.store().seed_user("grace", "grace@example.com").await;

    harness
        .context
        .distributor()
        .send_verify_email(VerifyEmailPayload { user_id: user.id }, TaskOptions::new())
        .await
        .unwrap();
    let task = next_task(&harness).await;

    assert_eq!(task.queue, queues::DEFAULT);
    assert_eq!(task.task_type.as_deref(), Some(task_types::SEND_VERIFY_EMAIL));
    assert_eq!(task.disposition, TaskDisposition::Completed);

    let state = harness.store().snapshot().await;
    assert_eq!(state.verify_emails.len(), 1);
    let record = state.verify_emails.values().next().unwrap();
    assert_eq!(record.user_id, user.id);
    assert_eq!(record.email, "grace@example.com");
    assert!(!record.is_used);
    let ttl = record.expired_at - record.created_at;
    assert!((ttl.num_minutes() - system::VERIFY_EMAIL_TTL_MINUTES).abs() <= 1);

    let sent = harness.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec!["grace@example.com".to_string()]);
    assert_eq!(sent[0].subject, "Verify your email address");
    assert!(sent[0].body.contains(VERIFY_URL_BASE));
    assert!(sent[0].body.contains(&record.secret_code));
    assert!(sent[0].body.contains("secret_code="));

    assert_eq!(harness.messaging().queue_length(queues::DEFAULT).await, 0);
}

#[tokio::test]
async fn test_missing_user_is_skipped_without_retry() {
    let harness = TaskHarness::new(3).await;

    harness
        .context
        .distributor()
        .send_verify_email(VerifyEmailPayload { user_id: 4_242 }, TaskOptions::new())
        .await
        .unwrap();
    let task = next_task(&harness).await;

    assert!(matches!(task.disposition, TaskDisposition::Skipped { .. }));
    assert_eq!(harness.mailer.attempts(), 0);
    assert_eq!(harness.messaging().queue_length(queues::DEFAULT).await, 0);
    assert_eq!(harness.messaging().archived_messages(queues::DEFAULT).await.len(), 1);
    assert!(harness.processor.process_next_batch().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_mail_failure_is_retried_until_dead_lettered() {
    let harness = TaskHarness::new(3).await;
    let user = harness.store().seed_user("grace", "grace@example.com").await;
    harness.mailer.set_failing(true);

    harness
        .context
        .distributor()
        .send_verify_email(VerifyEmailPayload { user_id: user.id }, TaskOptions::new())
        .await
        .unwrap();

    let first = next_task(&harness).await;
    let second = next_task(&harness).await;
    let third = next_task(&harness).await;

    assert!(matches!(first.disposition, TaskDisposition::Retrying { attempt: 1, .. }));
    assert!(matches!(second.disposition, TaskDisposition::Retrying { attempt: 2, .. }));
    assert_eq!(third.disposition, TaskDisposition::DeadLettered { attempts: 3 });
    assert_eq!(harness.mailer.attempts(), 3);

    let state = harness.store().snapshot().await;
    let live: Vec<_> = state
        .verify_emails
        .values()
        .filter(|v| v.is_live(chrono::Utc::now()))
        .collect();
    assert_eq!(state.verify_emails.len(), 1);
    assert_eq!(live.len(), 1);

    assert!(harness.processor.process_next_batch().await.unwrap().is_empty());
    let archived = harness.messaging().archived_messages(queues::DEFAULT).await;
    assert_eq!(archived.len(), 1);
    assert_eq!(archived[0].receive_count, 3);
}

#[tokio::test]
async fn test_redelivery_resends_the_same_code() {
    let harness = TaskHarness::new(3).await;
    let user = harness.store().seed_user("grace", "grace@example.com").await;
    harness.mailer.set_failing(true);

    harness
        .context
        .distributor()
        .send_verify_email(VerifyEmailPayload { user_id: user.id }, TaskOptions::new())
        .await
        .unwrap();
    let failed = next_task(&harness).await;
    assert!(matches!(failed.disposition, TaskDisposition::Retrying { .. }));

    harness.mailer.set_failing(false);
    let delivered = next_task(&harness).await;
    assert_eq!(delivered.disposition, TaskDisposition::Completed);

    let state = harness.store().snapshot().await;
    assert_eq!(state.verify_emails.len(), 1);
    let record = state.verify_emails.values().next().unwrap();
    assert!(harness.mailer.sent()[0].body.contains(&record.secret_code));
}

#[tokio::test]
async fn test_per_task_attempt_limit_overrides_default() {
    let harness = TaskHarness::new(5).await;
    let user = harness.store().seed_user("grace", "grace@example.com").await;
    harness.mailer.set_failing(true);

    harness
        .context
        .distributor()
        .send_verify_email(
            VerifyEmailPayload { user_id: user.id },
            TaskOptions::new().max_attempts(1),
        )
        .await
        .unwrap();

    let task = next_task(&harness).await;
    assert_eq!(task.disposition, TaskDisposition::DeadLettered { attempts: 1 });
}

#[tokio::test]
async fn test_transient_store_failure_is_retried() {
    let harness = TaskHarness::new(3).await;
    let user = harness.store().seed_user("grace", "grace@example.com").await;
    harness.store().fail_reads(true);

    harness
        .context
        .distributor()
        .send_verify_email(VerifyEmailPayload { user_id: user.id }, TaskOptions::new())
        .await
        .unwrap();

    let failed = next_task(&harness).await;
    assert!(matches!(failed.disposition, TaskDisposition::Retrying { .. }));

    harness.store().fail_reads(false);
    let recovered = next_task(&harness).await;
    assert_eq!(recovered.disposition, TaskDisposition::Completed);
    assert_eq!(recovered.receive_count, 2);
    assert_eq!(harness.mailer.sent().len(), 1);
}

/// Fails every render after producing a greeting
struct TruncatingRenderer;

impl TemplateRenderer for TruncatingRenderer {
    fn render(&self, template: &MailTemplate) -> Result<String, RenderError> {
        Err(RenderError {
            template: template.path(),
            message: "filter failed".to_string(),
            partial_body: "<p>Hello grace".to_string(),
        })
    }
}

#[tokio::test]
async fn test_render_failure_still_sends_partial_body() {
    let harness = TaskHarness::with_renderer(Arc::new(TruncatingRenderer), 3).await;
    let user = harness.store().seed_user("grace", "grace@example.com").await;

    harness
        .context
        .distributor()
        .send_verify_email(VerifyEmailPayload { user_id: user.id }, TaskOptions::new())
        .await
        .unwrap();
    let task = next_task(&harness).await;

    assert_eq!(task.disposition, TaskDisposition::Completed);
    let sent = harness.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "<p>Hello grace");
}

#[tokio::test]
async fn test_malformed_payload_is_skipped() {
    let harness = TaskHarness::new(3).await;

    harness
        .context
        .distributor()
        .enqueue(
            task_types::SEND_VERIFY_EMAIL,
            &json!({ "user": "not-an-id" }),
            TaskOptions::new(),
        )
        .await
        .unwrap();
    let task = next_task(&harness).await;

    assert!(matches!(task.disposition, TaskDisposition::Skipped { .. }));
    assert_eq!(harness.mailer.attempts(), 0);
    assert_eq!(harness.messaging().archived_messages(queues::DEFAULT).await.len(), 1);
}

#[tokio::test]
async fn test_unknown_task_type_is_skipped() {
    let harness = TaskHarness::new(3).await;

    harness
        .context
        .distributor()
        .enqueue("task:send_newsletter", &json!({}), TaskOptions::new())
        .await
        .unwrap();
    let task = next_task(&harness).await;

    assert_eq!(task.task_type.as_deref(), Some("task:send_newsletter"));
    assert!(matches!(task.disposition, TaskDisposition::Skipped { .. }));
}

#[tokio::test]
async fn test_checkout_confirmation_mail_end_to_end() {
    let harness = TaskHarness::new(3).await;
    let store = harness.store();
    let user = store.seed_user("ada", "ada@example.com").await;
    let address = store.seed_address(user.id, "Ada Lovelace", true).await;
    let teapot = store.seed_product("Teapot", money(1000), 10).await;
    let cup = store.seed_product("Cup", money(500), 10).await;
    let cart = store.seed_cart_item(user.id, teapot.id, 2).await.unwrap();
    store.seed_cart_item(user.id, cup.id, 1).await.unwrap();

    let receipt = harness
        .context
        .checkout_workflow()
        .checkout(CheckoutRequest {
            user_id: user.id,
            cart_id: cart.id,
            address_id: address.id,
            payment_method: "cash".to_string(),
            cash_on_delivery: true,
        })
        .await
        .unwrap();

    let task = next_task(&harness).await;
    assert_eq!(task.queue, queues::CRITICAL);
    assert_eq!(
        task.task_type.as_deref(),
        Some(task_types::SEND_ORDER_CONFIRMATION)
    );
    assert_eq!(task.disposition, TaskDisposition::Completed);

    let sent = harness.mailer.sent();
    assert_eq!(sent.len(), 1);
    let mail = &sent[0];
    assert_eq!(mail.to, vec!["ada@example.com".to_string()]);
    assert_eq!(mail.subject, format!("Order #{} received", receipt.order.id));
    assert!(mail.body.contains("Teapot"));
    assert!(mail.body.contains("Cup"));
    assert!(mail.body.contains("20.00"), "teapot line total missing");
    assert!(mail.body.contains("25.00"));
    assert!(mail.body.contains("Ada Lovelace"));
}

#[tokio::test]
async fn test_confirmation_for_unknown_payment_is_skipped() {
    let harness = TaskHarness::new(3).await;

    harness
        .context
        .distributor()
        .send_order_confirmation(
            OrderConfirmationPayload { payment_id: 77 },
            TaskOptions::new().queue(queues::CRITICAL),
        )
        .await
        .unwrap();
    let task = next_task(&harness).await;

    assert_eq!(task.queue, queues::CRITICAL);
    assert!(matches!(task.disposition, TaskDisposition::Skipped { .. }));
    assert_eq!(harness.mailer.attempts(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_running_workers_deliver_then_shut_down() {
    let harness = TaskHarness::new(3).await;
    let store = harness.store();
    let mut user_ids = Vec::new();
    for i in 0..5 {
        user_ids.push(store.seed_user(&format!("user{i}"), &format!("user{i}@example.com")).await.id);
    }

    harness.processor.start().await.unwrap();
    for user_id in user_ids {
        harness
            .context
            .distributor()
            .send_verify_email(VerifyEmailPayload { user_id }, TaskOptions::new())
            .await
            .unwrap();
    }

    let delivered = tokio::time::timeout(Duration::from_secs(10), async {
        while harness.mailer.sent().len() < 5 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(delivered.is_ok(), "workers did not deliver all mail");

    harness.context.shutdown(Some(harness.processor.as_ref())).await;
    assert!(!harness.processor.is_running().await);

    let after_shutdown = harness
        .context
        .distributor()
        .send_verify_email(VerifyEmailPayload { user_id: 1 }, TaskOptions::new())
        .await;
    assert!(after_shutdown.is_err());
}

#[tokio::test]
async fn test_store_closed_after_shutdown() {
    let harness = TaskHarness::new(3).await;

    harness.context.shutdown(None).await;

    assert!(harness.store().is_closed());
    let result = harness.context.order_lifecycle().cancel(1).await;
    assert!(matches!(result, Err(CommerceError::Transient(_))));
}
