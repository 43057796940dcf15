//! Application context handed to the task manager.

use crate::evidence::EvidenceStore;
use crate::mail::Mailer;
use crate::thumbnails::{ThumbnailRenderer, ThumbnailService};
use candor_config::MailConfig;
use candor_tasks::{AppContext, ContextGuard, TaskContext, TaskError, TaskId, TaskResult};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Collaborators the background jobs need.
///
/// Built once at startup and attached to the manager; every attempt runs
/// inside it.
pub struct ServiceContext {
    thumbnails: Arc<ThumbnailService>,
    mailer: Arc<dyn Mailer>,
    mail: MailConfig,
    active: Arc<AtomicUsize>,
}

impl ServiceContext {
    pub fn new(
        store: Arc<dyn EvidenceStore>,
        renderer: Arc<dyn ThumbnailRenderer>,
        mailer: Arc<dyn Mailer>,
        mail: MailConfig,
    ) -> Self {
        Self {
            thumbnails: Arc::new(ThumbnailService::new(store, renderer)),
            mailer,
            mail,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The context an attempt runs in.
    ///
    /// Fails with a configuration error when none is attached, so a task
    /// submitted before startup finished is retried.
    pub fn from_task(ctx: &TaskContext) -> TaskResult<&Self> {
        ctx.state::<Self>().ok_or_else(|| {
            TaskError::Configuration(format!("{}: service context not attached", ctx.task_id))
        })
    }

    #[must_use]
    pub fn thumbnails(&self) -> &Arc<ThumbnailService> {
        &self.thumbnails
    }

    #[must_use]
    pub fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    #[must_use]
    pub fn mail_config(&self) -> &MailConfig {
        &self.mail
    }

    /// Attempts currently inside this context.
    #[must_use]
    pub fn active_attempts(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl AppContext for ServiceContext {
    fn name(&self) -> &str {
        "services"
    }

    fn enter(&self, task_id: &TaskId) -> ContextGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        trace!(task_id = %task_id, "Entered service context");

        let active = Arc::clone(&self.active);
        ContextGuard::on_exit(move || {
            active.fetch_sub(1, Ordering::SeqCst);
        })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
