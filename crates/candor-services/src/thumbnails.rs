//! Thumbnail generation job.
//!
//! Evidence uploads are accepted immediately and their previews are built
//! in the background: a blurred thumbnail for images, a placeholder card
//! for documents and videos.

use crate::context::ServiceContext;
use crate::error::{ServiceError, ServiceResult};
use crate::evidence::{Evidence, EvidenceStore, EvidenceTransaction};
use crate::markup::escape;
use async_trait::async_trait;
use candor_core::Interface;
use candor_tasks::{handler, TaskArgs, TaskHandler, TaskId, TaskQueueInterface, TaskResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Retry budget for a thumbnail task.
pub const THUMBNAIL_MAX_RETRIES: u32 = 2;

/// Task id for a submission's thumbnail job.
#[must_use]
pub fn thumbnail_task_id(submission_id: i64) -> TaskId {
    TaskId::new(format!("thumbnails_{submission_id}"))
}

/// Produces preview files.
///
/// Returning `Ok(None)` means nothing was produced; the record is left
/// without a thumbnail.
#[async_trait]
pub trait ThumbnailRenderer: Interface + Send + Sync {
    /// Renders a privacy-preserving preview of an image file.
    async fn privacy_thumbnail(&self, source: &Path, evidence_id: i64)
        -> ServiceResult<Option<PathBuf>>;

    /// Renders a placeholder card for a non-image file.
    async fn placeholder(
        &self,
        evidence_id: i64,
        original_filename: &str,
        description: Option<&str>,
    ) -> ServiceResult<Option<PathBuf>>;
}

/// Renderer that writes files under one directory.
///
/// Image previews are copies of the source; placeholders are small SVG
/// cards naming the file.
#[derive(Debug, Clone)]
pub struct FileThumbnailRenderer {
    output_dir: PathBuf,
}

impl FileThumbnailRenderer {
    /// Creates a renderer writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Output directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl ThumbnailRenderer for FileThumbnailRenderer {
    async fn privacy_thumbnail(
        &self,
        source: &Path,
        evidence_id: i64,
    ) -> ServiceResult<Option<PathBuf>> {
        let ext = source
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("img");
        let target = self
            .output_dir
            .join(format!("evidence_{evidence_id}_thumb.{ext}"));

        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::copy(source, &target)
            .await
            .map_err(|e| ServiceError::render(format!("{}: {e}", source.display())))?;
        Ok(Some(target))
    }

    async fn placeholder(
        &self,
        evidence_id: i64,
        original_filename: &str,
        description: Option<&str>,
    ) -> ServiceResult<Option<PathBuf>> {
        let target = self
            .output_dir
            .join(format!("evidence_{evidence_id}_placeholder.svg"));
        let card = placeholder_svg(original_filename, description.unwrap_or_default());

        tokio::fs::create_dir_all(&self.output_dir).await?;
        tokio::fs::write(&target, card).await?;
        Ok(Some(target))
    }
}

fn placeholder_svg(filename: &str, description: &str) -> String {
    format!(
        concat!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="300" height="200">"##,
            r##"<rect width="100%" height="100%" fill="#f1f3f5"/>"##,
            r##"<text x="20" y="90" font-size="16">{}</text>"##,
            r##"<text x="20" y="120" font-size="12" fill="#666">{}</text>"##,
            "</svg>"
        ),
        escape(filename),
        escape(description)
    )
}

/// Counts from one thumbnail run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailReport {
    /// Image previews produced.
    pub thumbnails: u32,
    /// Placeholder cards produced.
    pub placeholders: u32,
    /// Records left untouched.
    pub skipped: u32,
    /// Records whose rendering or staging failed.
    pub failed: u32,
}

enum Produced {
    Thumbnail,
    Placeholder,
}

/// Builds previews for a submission's evidence.
pub struct ThumbnailService {
    store: Arc<dyn EvidenceStore>,
    renderer: Arc<dyn ThumbnailRenderer>,
}

impl ThumbnailService {
    pub fn new(store: Arc<dyn EvidenceStore>, renderer: Arc<dyn ThumbnailRenderer>) -> Self {
        Self { store, renderer }
    }

    /// Evidence store this service writes to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EvidenceStore> {
        &self.store
    }

    /// Generates missing previews for every evidence row of a submission.
    ///
    /// The run owns one transaction. A failure on one row is logged and
    /// the row skipped. Staged paths are committed once at the end; if the
    /// commit fails, this run's writes are rolled back and the error is
    /// returned so the task can be retried.
    pub async fn generate_for_submission(&self, submission_id: i64) -> ServiceResult<ThumbnailReport> {
        let evidence = self
            .store
            .list_by_submission(submission_id)
            .await
            .map_err(|e| {
                error!(submission_id, error = %e, "Failed to list evidence");
                e
            })?;
        let mut tx = self.store.begin().await?;

        let mut report = ThumbnailReport::default();
        for item in &evidence {
            match self.process(tx.as_mut(), item).await {
                Ok(Some(Produced::Thumbnail)) => {
                    report.thumbnails += 1;
                    info!(evidence_id = item.id, "Generated thumbnail");
                }
                Ok(Some(Produced::Placeholder)) => {
                    report.placeholders += 1;
                    info!(evidence_id = item.id, "Generated placeholder");
                }
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(evidence_id = item.id, error = %e, "Failed to process evidence");
                }
            }
        }

        if let Err(e) = tx.commit().await {
            error!(submission_id, error = %e, "Thumbnail generation failed");
            if let Err(rollback) = tx.rollback().await {
                warn!(submission_id, error = %rollback, "Rollback failed");
            }
            return Err(e);
        }

        info!(
            submission_id,
            thumbnails = report.thumbnails,
            placeholders = report.placeholders,
            skipped = report.skipped,
            failed = report.failed,
            "Thumbnail generation finished"
        );
        Ok(report)
    }

    async fn process(
        &self,
        tx: &mut dyn EvidenceTransaction,
        item: &Evidence,
    ) -> ServiceResult<Option<Produced>> {
        if item.has_thumbnail() {
            return Ok(None);
        }

        let (path, produced) = if item.category.is_image() {
            if !tokio::fs::try_exists(&item.file_path).await.unwrap_or(false) {
                debug!(evidence_id = item.id, path = %item.file_path.display(), "Source file missing");
                return Ok(None);
            }
            let path = self
                .renderer
                .privacy_thumbnail(&item.file_path, item.id)
                .await?;
            (path, Produced::Thumbnail)
        } else if item.category.uses_placeholder() {
            let path = self
                .renderer
                .placeholder(item.id, &item.original_filename, item.description.as_deref())
                .await?;
            (path, Produced::Placeholder)
        } else {
            return Ok(None);
        };

        let Some(path) = path else {
            return Ok(None);
        };
        tx.update_thumbnail(item.id, &path).await?;
        Ok(Some(produced))
    }

    /// Enqueues a thumbnail task for every submission that still has
    /// evidence without a preview. Returns the submission ids, ascending.
    pub async fn backfill_missing(&self, queue: &dyn TaskQueueInterface) -> ServiceResult<Vec<i64>> {
        let submissions: BTreeSet<i64> = self
            .store
            .list_missing_thumbnails()
            .await?
            .into_iter()
            .map(|e| e.submission_id)
            .collect();

        for &submission_id in &submissions {
            enqueue_thumbnails(queue, submission_id)?;
        }

        info!(count = submissions.len(), "Queued thumbnail backfill");
        Ok(submissions.into_iter().collect())
    }
}

/// Task callable for `thumbnails_{id}`.
///
/// Positional argument 0 is the submission id. The service is taken from
/// the [`ServiceContext`] the attempt runs in.
#[must_use]
pub fn thumbnail_job() -> TaskHandler {
    handler(|args, ctx| async move {
        let submission_id: i64 = args.arg(0)?;
        let service = Arc::clone(ServiceContext::from_task(&ctx)?.thumbnails());
        let report = service.generate_for_submission(submission_id).await?;
        Ok(serde_json::to_value(report)?)
    })
}

/// Queues the thumbnail job for a submission.
pub fn enqueue_thumbnails(queue: &dyn TaskQueueInterface, submission_id: i64) -> TaskResult<TaskId> {
    let id = thumbnail_task_id(submission_id);
    queue.submit_task(
        id.clone(),
        thumbnail_job(),
        TaskArgs::new().with_arg(submission_id),
        THUMBNAIL_MAX_RETRIES,
    )?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id() {
        assert_eq!(thumbnail_task_id(42).as_str(), "thumbnails_42");
    }

    #[test]
    fn test_placeholder_escapes_text() {
        let svg = placeholder_svg("a<b>.pdf", "Tom & \"Jerry\"");
        assert!(svg.contains("a&lt;b&gt;.pdf"));
        assert!(svg.contains("Tom &amp; &quot;Jerry&quot;"));
        assert!(svg.starts_with("<svg"));
    }

    #[tokio::test]
    async fn test_file_renderer_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("photo.png");
        tokio::fs::write(&source, b"png-bytes").await.unwrap();

        let renderer = FileThumbnailRenderer::new(dir.path().join("thumbs"));
        let thumb = renderer.privacy_thumbnail(&source, 5).await.unwrap().unwrap();
        assert!(thumb.ends_with("evidence_5_thumb.png"));
        assert_eq!(tokio::fs::read(&thumb).await.unwrap(), b"png-bytes");

        let card = renderer.placeholder(6, "notes.pdf", None).await.unwrap().unwrap();
        let body = tokio::fs::read_to_string(&card).await.unwrap();
        assert!(body.contains("notes.pdf"));
    }

    #[tokio::test]
    async fn test_file_renderer_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FileThumbnailRenderer::new(dir.path());
        let err = renderer
            .privacy_thumbnail(&dir.path().join("gone.jpg"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Render(_)));
    }
}
