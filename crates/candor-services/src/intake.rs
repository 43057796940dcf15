//! Enqueuers called after a submission or appeal is stored.
//!
//! The request handler persists the record, then hands the slow follow-up
//! work (previews, confirmation mail, admin notification) to the task
//! queue and returns.

use crate::error::ServiceResult;
use crate::mail::{enqueue_email, EmailMessage};
use crate::markup::escape;
use crate::thumbnails::enqueue_thumbnails;
use candor_config::MailConfig;
use candor_tasks::{TaskId, TaskQueueInterface};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

/// Longest appeal reason quoted in the admin notification.
const REASON_SUMMARY_CHARS: usize = 300;

/// A stored review submission.
#[derive(Debug, Clone)]
pub struct SubmissionReceipt {
    pub submission_id: i64,
    pub submitter_email: Option<String>,
    /// Who the review is about.
    pub subject_name: String,
    pub submitted_at: DateTime<Utc>,
}

/// A stored appeal against a submission.
#[derive(Debug, Clone)]
pub struct AppealReceipt {
    pub appeal_id: i64,
    pub submission_id: i64,
    pub email: Option<String>,
    pub reason: String,
    pub evidence_link: Option<String>,
    pub evidence_description: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Task ids queued by one intake call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntakeOutcome {
    pub enqueued: Vec<TaskId>,
}

impl IntakeOutcome {
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.enqueued.iter().any(|t| t.as_str() == id)
    }
}

/// Queues background work for new submissions and appeals.
pub struct IntakeService {
    queue: Arc<dyn TaskQueueInterface>,
    mail: MailConfig,
}

impl IntakeService {
    pub fn new(queue: Arc<dyn TaskQueueInterface>, mail: MailConfig) -> Self {
        Self { queue, mail }
    }

    /// Queues `thumbnails_{id}` and, when the submitter left an address,
    /// `email_upload_{id}`.
    pub fn on_submission(&self, receipt: &SubmissionReceipt) -> ServiceResult<IntakeOutcome> {
        let mut outcome = IntakeOutcome::default();
        let queue = self.queue.as_ref();

        outcome
            .enqueued
            .push(enqueue_thumbnails(queue, receipt.submission_id)?);

        match non_blank(receipt.submitter_email.as_deref()) {
            Some(email) => {
                let id = TaskId::new(format!("email_upload_{}", receipt.submission_id));
                let message = submission_confirmation(receipt, email);
                outcome.enqueued.push(enqueue_email(queue, id, &message)?);
            }
            None => debug!(
                submission_id = receipt.submission_id,
                "No submitter email, skipping confirmation"
            ),
        }

        info!(
            submission_id = receipt.submission_id,
            tasks = outcome.enqueued.len(),
            "Queued submission follow-up"
        );
        Ok(outcome)
    }

    /// Queues `email_appeal_user_{id}` when the appellant left an address
    /// and `email_appeal_admin_{id}` when an admin recipient is configured.
    pub fn on_appeal(&self, receipt: &AppealReceipt) -> ServiceResult<IntakeOutcome> {
        let mut outcome = IntakeOutcome::default();
        let queue = self.queue.as_ref();
        let sender = self.mail.sender();

        if let Some(email) = non_blank(receipt.email.as_deref()) {
            let id = TaskId::new(format!("email_appeal_user_{}", receipt.appeal_id));
            let message = appeal_confirmation(receipt, email).with_sender(sender);
            outcome.enqueued.push(enqueue_email(queue, id, &message)?);
        }

        if let Some(admin) = non_blank(self.mail.admin()) {
            let id = TaskId::new(format!("email_appeal_admin_{}", receipt.appeal_id));
            let message =
                appeal_notification(receipt, admin, self.mail.site_url.as_deref()).with_sender(sender);
            outcome.enqueued.push(enqueue_email(queue, id, &message)?);
        } else {
            debug!(appeal_id = receipt.appeal_id, "No admin recipient, skipping notification");
        }

        info!(
            appeal_id = receipt.appeal_id,
            tasks = outcome.enqueued.len(),
            "Queued appeal follow-up"
        );
        Ok(outcome)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

fn summarize(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(REASON_SUMMARY_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn submission_confirmation(receipt: &SubmissionReceipt, email: &str) -> EmailMessage {
    EmailMessage::new(
        "Candor - Review submission received",
        email,
        "Submission received",
        "<p>Thank you for your review. It has been received and is waiting for moderation.</p>\
         <p><strong>Expected handling time:</strong> within 30 minutes</p>",
    )
    .with_details(format!(
        "<strong>About:</strong> {}<br><strong>Submitted:</strong> {}<br><strong>Submission ID:</strong> #{}",
        escape(&receipt.subject_name),
        timestamp(receipt.submitted_at),
        receipt.submission_id
    ))
}

fn appeal_confirmation(receipt: &AppealReceipt, email: &str) -> EmailMessage {
    let mut content = String::from(
        "<p>Your appeal has been received. Our moderators will review it and reply by email.</p>",
    );
    if receipt.evidence_link.is_some() {
        content.push_str(
            "<p><strong>Reminder:</strong> make sure the shared link is viewable by anyone \
             and contains proof of identity and supporting material.</p>",
        );
    }

    EmailMessage::new("Candor - Appeal received", email, "Appeal received", content).with_details(
        format!(
            "<strong>Record ID:</strong> #{}<br><strong>Submitted:</strong> {}<br><strong>Appeal ID:</strong> #{}",
            receipt.submission_id,
            timestamp(receipt.submitted_at),
            receipt.appeal_id
        ),
    )
}

fn appeal_notification(receipt: &AppealReceipt, admin: &str, site_url: Option<&str>) -> EmailMessage {
    let mut content = format!(
        "<p>A new appeal is waiting for review.</p><p><strong>Summary:</strong></p><p>{}</p>",
        escape(&summarize(&receipt.reason))
    );
    if let Some(link) = &receipt.evidence_link {
        let link = escape(link);
        content.push_str(&format!(
            "<p><strong>Evidence link:</strong> <a href=\"{link}\">{link}</a></p>\
             <p><strong>Notes:</strong> {}</p>",
            escape(receipt.evidence_description.as_deref().unwrap_or("none"))
        ));
    }

    let message = EmailMessage::new("Candor - New appeal", admin, "New appeal", content).with_details(
        format!(
            "<strong>Record ID:</strong> #{}<br><strong>Appellant:</strong> {}<br>\
             <strong>Submitted:</strong> {}<br><strong>Appeal ID:</strong> #{}",
            receipt.submission_id,
            escape(receipt.email.as_deref().unwrap_or("-")),
            timestamp(receipt.submitted_at),
            receipt.appeal_id
        ),
    );

    match site_url {
        Some(base) => message.with_button(
            "View appeals",
            format!("{}/admin/appeals", base.trim_end_matches('/')),
        ),
        None => message,
    }
}
