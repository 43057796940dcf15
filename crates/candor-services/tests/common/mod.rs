//! Shared fixtures for service integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use candor_config::MailConfig;
use candor_services::{
    Evidence, EvidenceCategory, EvidenceStore, EvidenceTransaction, FileThumbnailRenderer,
    InMemoryEvidenceStore, Mailer, ServiceContext, ServiceError, ServiceResult, ThumbnailRenderer,
};
use candor_tasks::{ManagerConfig, SharedContext, TaskManager, TaskStatus};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Short intervals so retries finish quickly.
pub fn fast_config() -> ManagerConfig {
    ManagerConfig::default()
        .with_poll_interval(Duration::from_millis(20))
        .with_backoff_base(Duration::from_millis(50))
        .with_join_timeout(Duration::from_secs(2))
        .with_shutdown_timeout(Duration::from_secs(2))
}

/// Mail settings with a relay configured.
pub fn mail_config() -> MailConfig {
    MailConfig {
        server: Some("smtp.example.com".into()),
        username: Some("relay@candor.example".into()),
        admin_recipient: Some("admin@candor.example".into()),
        site_url: Some("https://candor.example".into()),
        ..MailConfig::default()
    }
}

/// Upload directory with evidence rows for submission 1:
///
/// | id | category   | state                       |
/// |----|------------|-----------------------------|
/// | 1  | image      | file exists                 |
/// | 2  | chat_image | file missing                |
/// | 3  | document   |                             |
/// | 4  | video      | already has a thumbnail     |
/// | 5  | other      |                             |
///
/// and one document (id 6) for submission 2.
pub struct Uploads {
    pub dir: TempDir,
    pub store: Arc<InMemoryEvidenceStore>,
}

impl Uploads {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let photo = dir.path().join("photo.jpg");
        std::fs::write(&photo, b"jpeg").expect("Failed to write photo");

        let store = Arc::new(InMemoryEvidenceStore::new());
        store.insert(Evidence::new(1, 1, EvidenceCategory::Image, &photo, "photo.jpg"));
        store.insert(Evidence::new(
            2,
            1,
            EvidenceCategory::ChatImage,
            dir.path().join("gone.png"),
            "gone.png",
        ));
        store.insert(
            Evidence::new(3, 1, EvidenceCategory::Document, dir.path().join("a.pdf"), "a.pdf")
                .with_description("transcript"),
        );
        store.insert(
            Evidence::new(4, 1, EvidenceCategory::Video, dir.path().join("v.mp4"), "v.mp4")
                .with_thumbnail("thumbs/old.svg"),
        );
        store.insert(Evidence::new(5, 1, EvidenceCategory::Other, dir.path().join("x.bin"), "x.bin"));
        store.insert(Evidence::new(6, 2, EvidenceCategory::Document, dir.path().join("b.pdf"), "b.pdf"));

        Self { dir, store }
    }

    pub fn thumb_dir(&self) -> PathBuf {
        self.dir.path().join("thumbs")
    }

    pub fn renderer(&self) -> Arc<FileThumbnailRenderer> {
        Arc::new(FileThumbnailRenderer::new(self.thumb_dir()))
    }

    pub fn context(&self, mailer: Arc<dyn Mailer>, mail: MailConfig) -> Arc<ServiceContext> {
        Arc::new(ServiceContext::new(
            Arc::clone(&self.store) as Arc<dyn EvidenceStore>,
            self.renderer(),
            mailer,
            mail,
        ))
    }
}

/// Started manager running inside `context`.
pub fn started_manager(context: Arc<ServiceContext>) -> Arc<TaskManager> {
    let manager = Arc::new(TaskManager::with_context(
        fast_config(),
        context as SharedContext,
    ));
    manager.start().expect("Failed to start manager");
    manager
}

/// Waits until `id` reaches completed or failed.
pub async fn wait_terminal(manager: &TaskManager, id: &str, limit: Duration) -> TaskStatus {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if manager.get_task_status(id).is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    manager.get_task_status(id)
}

/// Renderer that fails for one evidence id and delegates otherwise.
pub struct FlakyRenderer {
    pub inner: FileThumbnailRenderer,
    pub fail_for: i64,
}

#[async_trait]
impl ThumbnailRenderer for FlakyRenderer {
    async fn privacy_thumbnail(&self, source: &Path, evidence_id: i64) -> ServiceResult<Option<PathBuf>> {
        if evidence_id == self.fail_for {
            return Err(ServiceError::render("corrupt image"));
        }
        self.inner.privacy_thumbnail(source, evidence_id).await
    }

    async fn placeholder(
        &self,
        evidence_id: i64,
        original_filename: &str,
        description: Option<&str>,
    ) -> ServiceResult<Option<PathBuf>> {
        if evidence_id == self.fail_for {
            return Err(ServiceError::render("placeholder failed"));
        }
        self.inner
            .placeholder(evidence_id, original_filename, description)
            .await
    }
}

/// Store whose commits always fail.
pub struct BrokenCommitStore {
    pub inner: Arc<InMemoryEvidenceStore>,
    pub commits: Arc<AtomicU32>,
    pub rollbacks: Arc<AtomicU32>,
}

impl BrokenCommitStore {
    pub fn new(inner: Arc<InMemoryEvidenceStore>) -> Self {
        Self {
            inner,
            commits: Arc::new(AtomicU32::new(0)),
            rollbacks: Arc::new(AtomicU32::new(0)),
        }
    }
}

#[async_trait]
impl EvidenceStore for BrokenCommitStore {
    async fn find_by_id(&self, id: i64) -> ServiceResult<Option<Evidence>> {
        self.inner.find_by_id(id).await
    }

    async fn list_by_submission(&self, submission_id: i64) -> ServiceResult<Vec<Evidence>> {
        self.inner.list_by_submission(submission_id).await
    }

    async fn list_missing_thumbnails(&self) -> ServiceResult<Vec<Evidence>> {
        self.inner.list_missing_thumbnails().await
    }

    async fn begin(&self) -> ServiceResult<Box<dyn EvidenceTransaction>> {
        Ok(Box::new(BrokenCommitTransaction {
            inner: self.inner.begin().await?,
            commits: Arc::clone(&self.commits),
            rollbacks: Arc::clone(&self.rollbacks),
        }))
    }
}

struct BrokenCommitTransaction {
    inner: Box<dyn EvidenceTransaction>,
    commits: Arc<AtomicU32>,
    rollbacks: Arc<AtomicU32>,
}

#[async_trait]
impl EvidenceTransaction for BrokenCommitTransaction {
    async fn update_thumbnail(&mut self, id: i64, path: &Path) -> ServiceResult<()> {
        self.inner.update_thumbnail(id, path).await
    }

    async fn commit(&mut self) -> ServiceResult<()> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        Err(ServiceError::storage("database is locked"))
    }

    async fn rollback(&mut self) -> ServiceResult<()> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.rollback().await
    }

    fn staged_count(&self) -> usize {
        self.inner.staged_count()
    }
}
