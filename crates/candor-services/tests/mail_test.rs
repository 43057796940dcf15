//! Mail job and intake enqueuer tests.

mod common;

use async_trait::async_trait;
use candor_config::MailConfig;
use candor_services::{
    enqueue_email, AppealReceipt, EmailMessage, IntakeService, Mailer, ServiceError, ServiceResult,
    SubmissionReceipt, EMAIL_MAX_RETRIES,
};
use candor_tasks::{TaskId, TaskManager, TaskQueueInterface};
use chrono::Utc;
use common::{fast_config, mail_config, started_manager, wait_terminal, Uploads};
use mockall::mock;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

mock! {
    pub Relay {}

    #[async_trait]
    impl Mailer for Relay {
        async fn send(&self, message: &EmailMessage) -> ServiceResult<()>;
    }
}

fn receipt(email: Option<&str>) -> SubmissionReceipt {
    SubmissionReceipt {
        submission_id: 7,
        submitter_email: email.map(str::to_string),
        subject_name: "Prof. Example".into(),
        submitted_at: Utc::now(),
    }
}

fn appeal(email: Option<&str>) -> AppealReceipt {
    AppealReceipt {
        appeal_id: 11,
        submission_id: 7,
        email: email.map(str::to_string),
        reason: "This review is about someone else.".into(),
        evidence_link: Some("https://drive.example/folder".into()),
        evidence_description: Some("student card".into()),
        submitted_at: Utc::now(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_email_task_fills_default_sender() {
    let mut relay = MockRelay::new();
    relay
        .expect_send()
        .withf(|m| {
            m.subject == "Hello"
                && m.recipients == ["user@example.com"]
                && m.sender.as_deref() == Some("relay@candor.example")
        })
        .times(1)
        .returning(|_| Ok(()));

    let uploads = Uploads::new();
    let manager = started_manager(uploads.context(Arc::new(relay), mail_config()));

    let message = EmailMessage::new("Hello", "user@example.com", "Hi", "<p>body</p>");
    enqueue_email(&*manager, TaskId::from("email_test_1"), &message).expect("enqueue failed");

    let status = wait_terminal(&manager, "email_test_1", Duration::from_secs(2)).await;
    assert_eq!(status.name(), "completed");
    assert_eq!(status.result().and_then(|r| r.get("sent")), Some(&json!(true)));

    manager.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_email_skipped_without_mail_server() {
    let mut relay = MockRelay::new();
    relay.expect_send().times(0);

    let uploads = Uploads::new();
    let manager = started_manager(uploads.context(Arc::new(relay), MailConfig::default()));

    let message = EmailMessage::new("Hello", "user@example.com", "Hi", "<p>body</p>");
    enqueue_email(&*manager, TaskId::from("email_test_2"), &message).expect("enqueue failed");

    let status = wait_terminal(&manager, "email_test_2", Duration::from_secs(2)).await;
    assert_eq!(status.name(), "completed");
    assert_eq!(status.result().and_then(|r| r.get("sent")), Some(&json!(false)));

    manager.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_relay_failure_is_retried_then_fails() {
    let mut relay = MockRelay::new();
    relay
        .expect_send()
        .times(EMAIL_MAX_RETRIES as usize + 1)
        .returning(|_| Err(ServiceError::Mail("connection refused".into())));

    let uploads = Uploads::new();
    let manager = started_manager(uploads.context(Arc::new(relay), mail_config()));

    let message = EmailMessage::new("Hello", "user@example.com", "Hi", "<p>body</p>");
    enqueue_email(&*manager, TaskId::from("email_test_3"), &message).expect("enqueue failed");

    // Backoff 100ms + 200ms + 400ms before the last attempt.
    let status = wait_terminal(&manager, "email_test_3", Duration::from_secs(4)).await;
    assert_eq!(status.name(), "failed");
    assert!(status.error().expect("error").contains("connection refused"));
    assert_eq!(status.task().expect("task").current_retry, EMAIL_MAX_RETRIES);

    manager.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_invalid_message_fails() {
    let mut relay = MockRelay::new();
    relay.expect_send().times(0);

    let uploads = Uploads::new();
    let manager = started_manager(uploads.context(Arc::new(relay), mail_config()));

    let mut message = EmailMessage::new("Hello", "", "Hi", "<p>body</p>");
    message.recipients.clear();
    manager
        .submit_task(
            "email_test_4",
            candor_services::email_job(),
            candor_tasks::TaskArgs::new().with_arg(serde_json::to_value(&message).unwrap()),
            0,
        )
        .expect("submit failed");

    let status = wait_terminal(&manager, "email_test_4", Duration::from_secs(2)).await;
    assert_eq!(status.name(), "failed");
    assert!(status.error().expect("error").contains("no recipients"));

    manager.stop().await;
}

#[test]
fn test_submission_intake_queues_thumbnails_and_confirmation() {
    let queue = Arc::new(TaskManager::new(fast_config()));
    let intake = IntakeService::new(queue.clone(), mail_config());

    let outcome = intake
        .on_submission(&receipt(Some("  student@example.com ")))
        .expect("intake failed");

    assert_eq!(
        outcome.enqueued,
        vec![TaskId::from("thumbnails_7"), TaskId::from("email_upload_7")]
    );
    assert_eq!(queue.stats().queue_size, 2);
}

#[test]
fn test_submission_intake_without_email() {
    let queue = Arc::new(TaskManager::new(fast_config()));
    let intake = IntakeService::new(queue.clone(), mail_config());

    let outcome = intake.on_submission(&receipt(Some(" "))).expect("intake failed");

    assert!(outcome.contains("thumbnails_7"));
    assert!(!outcome.contains("email_upload_7"));
    assert_eq!(queue.stats().queue_size, 1);
}

#[test]
fn test_appeal_intake_variants() {
    let queue = Arc::new(TaskManager::new(fast_config()));

    let both = IntakeService::new(queue.clone(), mail_config())
        .on_appeal(&appeal(Some("appellant@example.com")))
        .expect("intake failed");
    assert_eq!(
        both.enqueued,
        vec![
            TaskId::from("email_appeal_user_11"),
            TaskId::from("email_appeal_admin_11")
        ]
    );

    // No relay account, sender or admin recipient: only the appellant is mailed.
    let user_only = IntakeService::new(queue.clone(), MailConfig::default())
        .on_appeal(&appeal(Some("appellant@example.com")))
        .expect("intake failed");
    assert_eq!(user_only.enqueued, vec![TaskId::from("email_appeal_user_11")]);

    let admin_only = IntakeService::new(queue.clone(), mail_config())
        .on_appeal(&appeal(None))
        .expect("intake failed");
    assert_eq!(admin_only.enqueued, vec![TaskId::from("email_appeal_admin_11")]);

    assert_eq!(queue.stats().queue_size, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_appeal_mail_delivered_end_to_end() {
    let mut relay = MockRelay::new();
    relay
        .expect_send()
        .withf(|m| m.recipients == ["admin@candor.example"])
        .times(1)
        .returning(|m| {
            assert_eq!(
                m.button_url.as_deref(),
                Some("https://candor.example/admin/appeals")
            );
            assert!(m.content_html.contains("drive.example"));
            Ok(())
        });
    relay
        .expect_send()
        .withf(|m| m.recipients == ["appellant@example.com"])
        .times(1)
        .returning(|_| Ok(()));

    let uploads = Uploads::new();
    let manager = started_manager(uploads.context(Arc::new(relay), mail_config()));
    let queue: Arc<dyn TaskQueueInterface> = manager.clone();

    IntakeService::new(queue, mail_config())
        .on_appeal(&appeal(Some("appellant@example.com")))
        .expect("intake failed");

    for id in ["email_appeal_user_11", "email_appeal_admin_11"] {
        let status = wait_terminal(&manager, id, Duration::from_secs(2)).await;
        assert_eq!(status.name(), "completed", "{id}");
    }

    manager.stop().await;
}
