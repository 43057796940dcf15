//! # Candor Services
//!
//! Background jobs run through the task manager, and the intake
//! enqueuers that schedule them after a submission or appeal is stored.

pub mod context;
pub mod error;
pub mod evidence;
pub mod intake;
pub mod mail;
mod markup;
pub mod thumbnails;

pub use context::ServiceContext;
pub use error::{ServiceError, ServiceResult};
pub use evidence::{
    Evidence, EvidenceCategory, EvidenceStore, EvidenceTransaction, InMemoryEvidenceStore,
};
pub use intake::{AppealReceipt, IntakeOutcome, IntakeService, SubmissionReceipt};
pub use mail::{email_job, enqueue_email, EmailMessage, LoggingMailer, Mailer, EMAIL_MAX_RETRIES};
pub use thumbnails::{
    enqueue_thumbnails, thumbnail_job, thumbnail_task_id, FileThumbnailRenderer, ThumbnailRenderer,
    ThumbnailReport, ThumbnailService, THUMBNAIL_MAX_RETRIES,
};
