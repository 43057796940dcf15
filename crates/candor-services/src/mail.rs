//! Outbound mail job.

use crate::context::ServiceContext;
use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use candor_core::Interface;
use candor_tasks::{handler, TaskArgs, TaskHandler, TaskId, TaskQueueInterface, TaskResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Retry budget for a mail task.
pub const EMAIL_MAX_RETRIES: u32 = 3;

/// Footer appended to every plain-text body.
const TEXT_FOOTER: &str = "---\nCandor\nThis message was sent automatically, please do not reply.";

/// A templated notification message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub subject: String,
    pub recipients: Vec<String>,
    pub title: String,
    pub content_html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_url: Option<String>,
    /// Explicit sender; the configured default is used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl EmailMessage {
    pub fn new(
        subject: impl Into<String>,
        recipient: impl Into<String>,
        title: impl Into<String>,
        content_html: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            recipients: vec![recipient.into()],
            title: title.into(),
            content_html: content_html.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_details(mut self, details_html: impl Into<String>) -> Self {
        self.details_html = Some(details_html.into());
        self
    }

    #[must_use]
    pub fn with_button(mut self, text: impl Into<String>, url: impl Into<String>) -> Self {
        self.button_text = Some(text.into());
        self.button_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_sender(mut self, sender: Option<&str>) -> Self {
        self.sender = sender.map(str::to_string);
        self
    }

    /// Checks the fields a relay needs.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.subject.trim().is_empty() {
            return Err(ServiceError::InvalidMessage("subject is empty".into()));
        }
        if self.recipients.iter().all(|r| r.trim().is_empty()) {
            return Err(ServiceError::InvalidMessage("no recipients".into()));
        }
        Ok(())
    }

    /// Plain-text alternative body.
    #[must_use]
    pub fn text_body(&self) -> String {
        let mut body = format!("{}\n\n{}", self.title, self.content_html.trim());
        if let Some(details) = &self.details_html {
            body.push_str("\n\nDetails:\n");
            body.push_str(details.trim());
        }
        if let Some(url) = &self.button_url {
            let label = self.button_text.as_deref().unwrap_or("View details");
            body.push_str(&format!("\n\n{label}: {url}"));
        }
        body.push_str("\n\n");
        body.push_str(TEXT_FOOTER);
        body
    }
}

/// Mail relay port.
#[async_trait]
pub trait Mailer: Interface + Send + Sync {
    /// Sends one message. The sender is already resolved.
    async fn send(&self, message: &EmailMessage) -> ServiceResult<()>;
}

/// Mailer that records deliveries in the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMailer;

#[async_trait]
impl Mailer for LoggingMailer {
    async fn send(&self, message: &EmailMessage) -> ServiceResult<()> {
        info!(
            subject = %message.subject,
            recipients = ?message.recipients,
            sender = message.sender.as_deref().unwrap_or_default(),
            "Email delivered"
        );
        Ok(())
    }
}

/// Task callable for the `email_*` tasks.
///
/// Positional argument 0 is the serialized [`EmailMessage`]. When no mail
/// server is configured the message is dropped and the task succeeds.
#[must_use]
pub fn email_job() -> TaskHandler {
    handler(|args, ctx| async move {
        let mut message: EmailMessage = args.arg(0)?;
        let services = ServiceContext::from_task(&ctx)?;

        if services.mail_config().server.is_none() {
            info!(subject = %message.subject, "Mail not configured, skipping");
            return Ok(json!({ "sent": false }));
        }

        message.validate()?;
        if message.sender.is_none() {
            message.sender = services.mail_config().sender().map(str::to_string);
        }

        let mailer = Arc::clone(services.mailer());
        mailer.send(&message).await?;
        info!(subject = %message.subject, recipients = ?message.recipients, "Email sent");
        Ok(json!({ "sent": true, "recipients": message.recipients }))
    })
}

/// Queues a message under `id`.
pub fn enqueue_email(
    queue: &dyn TaskQueueInterface,
    id: TaskId,
    message: &EmailMessage,
) -> TaskResult<TaskId> {
    let mut args = TaskArgs::new();
    args.push_serialized(message)?;
    queue.submit_task(id.clone(), email_job(), args, EMAIL_MAX_RETRIES)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> EmailMessage {
        EmailMessage::new("Received", "user@example.com", "Thanks", "<p>Hi</p>")
    }

    #[test]
    fn test_validate() {
        assert!(message().validate().is_ok());

        let mut no_rcpt = message();
        no_rcpt.recipients = vec![" ".into()];
        assert!(matches!(
            no_rcpt.validate(),
            Err(ServiceError::InvalidMessage(_))
        ));

        let mut no_subject = message();
        no_subject.subject.clear();
        assert!(no_subject.validate().is_err());
    }

    #[test]
    fn test_text_body() {
        let body = message()
            .with_details("<b>id</b> #3")
            .with_button("Open", "https://candor.example/admin")
            .text_body();

        assert!(body.starts_with("Thanks\n\n<p>Hi</p>"));
        assert!(body.contains("Details:\n<b>id</b> #3"));
        assert!(body.contains("Open: https://candor.example/admin"));
        assert!(body.ends_with("please do not reply."));
    }

    #[test]
    fn test_optional_fields_skipped_in_json() {
        let value = serde_json::to_value(message()).unwrap();
        assert!(value.get("button_url").is_none());
        let back: EmailMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, message());
    }
}
