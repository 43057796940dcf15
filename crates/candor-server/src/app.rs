//! Application wiring.

use candor_config::AppConfig;
use candor_core::{CandorError, CandorResult};
use candor_services::{
    EvidenceStore, FileThumbnailRenderer, InMemoryEvidenceStore, IntakeService, LoggingMailer,
    ServiceContext,
};
use candor_tasks::{register_metrics, ManagerConfig, SharedContext, TaskManager, TaskQueueInterface};
use std::sync::Arc;
use tracing::{info, warn};

/// The running worker process: task manager plus the services its jobs use.
pub struct App {
    config: AppConfig,
    manager: Arc<TaskManager>,
    store: Arc<InMemoryEvidenceStore>,
    context: Arc<ServiceContext>,
}

impl App {
    /// Builds every component. Nothing runs until [`App::start`].
    pub fn build(config: AppConfig) -> Self {
        let manager = Arc::new(TaskManager::new(ManagerConfig::from(&config.tasks)));
        let store = Arc::new(InMemoryEvidenceStore::new());
        let renderer = Arc::new(FileThumbnailRenderer::new(config.uploads.thumbnail_dir()));
        let context = Arc::new(ServiceContext::new(
            Arc::clone(&store) as Arc<dyn EvidenceStore>,
            renderer,
            Arc::new(LoggingMailer),
            config.mail.clone(),
        ));

        Self {
            config,
            manager,
            store,
            context,
        }
    }

    /// Starts the manager, then binds the service context to it.
    ///
    /// Tasks submitted before the context is attached fail their attempt
    /// and are retried inside it.
    pub fn start(&self) -> CandorResult<()> {
        register_metrics();
        self.manager
            .start()
            .map_err(|e| CandorError::internal(format!("Failed to start task manager: {e}")))?;

        let context: SharedContext = Arc::clone(&self.context) as SharedContext;
        if !self.manager.attach_context(context) {
            warn!("Task manager already had a context, keeping it");
        }

        info!(
            manager_id = self.manager.id(),
            workers = self.config.tasks.workers,
            dispatch = ?self.config.tasks.dispatch,
            "Task manager started"
        );
        Ok(())
    }

    /// Queues thumbnail jobs for evidence that has no preview yet.
    pub async fn backfill_thumbnails(&self) -> CandorResult<usize> {
        let submissions = self
            .context
            .thumbnails()
            .backfill_missing(&*self.manager)
            .await?;
        Ok(submissions.len())
    }

    /// Stops the manager and logs final counters.
    pub async fn shutdown(&self) {
        self.manager.stop().await;
        let stats = self.manager.get_stats();
        info!(
            pending = stats.queue_size,
            completed = stats.completed_count,
            failed = stats.failed_count,
            "Task manager stopped"
        );
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<TaskManager> {
        &self.manager
    }

    /// The manager as the injected queue interface.
    #[must_use]
    pub fn queue(&self) -> Arc<dyn TaskQueueInterface> {
        Arc::clone(&self.manager) as Arc<dyn TaskQueueInterface>
    }

    #[must_use]
    pub fn store(&self) -> &Arc<InMemoryEvidenceStore> {
        &self.store
    }

    /// Enqueuer for request handlers.
    #[must_use]
    pub fn intake(&self) -> IntakeService {
        IntakeService::new(self.queue(), self.config.mail.clone())
    }
}
