//! Evidence records and the persistence port the thumbnail job writes through.

use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use candor_core::Interface;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Kind of uploaded evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceCategory {
    Image,
    ChatImage,
    Document,
    Video,
    ChatVideo,
    Other,
}

impl EvidenceCategory {
    /// Stored name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::ChatImage => "chat_image",
            Self::Document => "document",
            Self::Video => "video",
            Self::ChatVideo => "chat_video",
            Self::Other => "other",
        }
    }

    /// Images get a blurred preview of the file itself.
    #[must_use]
    pub const fn is_image(self) -> bool {
        matches!(self, Self::Image | Self::ChatImage)
    }

    /// Documents and videos get a generated placeholder card.
    #[must_use]
    pub const fn uses_placeholder(self) -> bool {
        matches!(self, Self::Document | Self::Video | Self::ChatVideo)
    }
}

impl fmt::Display for EvidenceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvidenceCategory {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "image" => Self::Image,
            "chat_image" => Self::ChatImage,
            "document" => Self::Document,
            "video" => Self::Video,
            "chat_video" => Self::ChatVideo,
            "other" => Self::Other,
            unknown => {
                return Err(ServiceError::storage(format!(
                    "unknown evidence category '{unknown}'"
                )))
            }
        })
    }
}

/// One uploaded file attached to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: i64,
    pub submission_id: i64,
    pub category: EvidenceCategory,
    pub file_path: PathBuf,
    pub original_filename: String,
    pub description: Option<String>,
    pub thumbnail_path: Option<PathBuf>,
}

impl Evidence {
    /// Creates a record with no description and no thumbnail.
    pub fn new(
        id: i64,
        submission_id: i64,
        category: EvidenceCategory,
        file_path: impl Into<PathBuf>,
        original_filename: impl Into<String>,
    ) -> Self {
        Self {
            id,
            submission_id,
            category,
            file_path: file_path.into(),
            original_filename: original_filename.into(),
            description: None,
            thumbnail_path: None,
        }
    }

    /// Sets the user-provided description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets an existing thumbnail.
    #[must_use]
    pub fn with_thumbnail(mut self, path: impl Into<PathBuf>) -> Self {
        self.thumbnail_path = Some(path.into());
        self
    }

    /// True when a non-empty thumbnail path is recorded.
    #[must_use]
    pub fn has_thumbnail(&self) -> bool {
        self.thumbnail_path
            .as_deref()
            .is_some_and(|p| !p.as_os_str().is_empty())
    }
}

/// Evidence persistence.
///
/// Thumbnail writes go through an [`EvidenceTransaction`] opened with
/// [`EvidenceStore::begin`]; each transaction owns its staged writes.
#[async_trait]
pub trait EvidenceStore: Interface + Send + Sync {
    /// Finds one record.
    async fn find_by_id(&self, id: i64) -> ServiceResult<Option<Evidence>>;

    /// All records of a submission, ordered by id.
    async fn list_by_submission(&self, submission_id: i64) -> ServiceResult<Vec<Evidence>>;

    /// Records without a thumbnail, across all submissions.
    async fn list_missing_thumbnails(&self) -> ServiceResult<Vec<Evidence>>;

    /// Opens a unit of work.
    async fn begin(&self) -> ServiceResult<Box<dyn EvidenceTransaction>>;
}

/// One unit of work against an [`EvidenceStore`].
///
/// Writes stay invisible to readers and to other transactions until
/// [`EvidenceTransaction::commit`]. Dropping a transaction without
/// committing discards its writes.
#[async_trait]
pub trait EvidenceTransaction: Send {
    /// Stages a thumbnail path for a record.
    async fn update_thumbnail(&mut self, id: i64, path: &Path) -> ServiceResult<()>;

    /// Applies this transaction's staged writes.
    async fn commit(&mut self) -> ServiceResult<()>;

    /// Discards this transaction's staged writes.
    async fn rollback(&mut self) -> ServiceResult<()>;

    /// Number of writes staged and not yet committed.
    fn staged_count(&self) -> usize;
}

type Rows = Arc<RwLock<BTreeMap<i64, Evidence>>>;

/// Store backed by process memory.
///
/// Reads see committed rows only.
#[derive(Debug, Default)]
pub struct InMemoryEvidenceStore {
    rows: Rows,
}

impl InMemoryEvidenceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a committed record.
    pub fn insert(&self, evidence: Evidence) {
        self.rows.write().insert(evidence.id, evidence);
    }

    /// Number of committed records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// True when no records exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }
}

#[async_trait]
impl EvidenceStore for InMemoryEvidenceStore {
    async fn find_by_id(&self, id: i64) -> ServiceResult<Option<Evidence>> {
        Ok(self.rows.read().get(&id).cloned())
    }

    async fn list_by_submission(&self, submission_id: i64) -> ServiceResult<Vec<Evidence>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|e| e.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn list_missing_thumbnails(&self) -> ServiceResult<Vec<Evidence>> {
        Ok(self
            .rows
            .read()
            .values()
            .filter(|e| !e.has_thumbnail())
            .cloned()
            .collect())
    }

    async fn begin(&self) -> ServiceResult<Box<dyn EvidenceTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            rows: Arc::clone(&self.rows),
            staged: Vec::new(),
        }))
    }
}

struct InMemoryTransaction {
    rows: Rows,
    staged: Vec<(i64, PathBuf)>,
}

#[async_trait]
impl EvidenceTransaction for InMemoryTransaction {
    async fn update_thumbnail(&mut self, id: i64, path: &Path) -> ServiceResult<()> {
        if !self.rows.read().contains_key(&id) {
            return Err(ServiceError::EvidenceNotFound(id));
        }
        self.staged.push((id, path.to_path_buf()));
        Ok(())
    }

    async fn commit(&mut self) -> ServiceResult<()> {
        let staged = std::mem::take(&mut self.staged);
        let mut rows = self.rows.write();
        for (id, path) in staged {
            if let Some(row) = rows.get_mut(&id) {
                row.thumbnail_path = Some(path);
            }
        }
        Ok(())
    }

    async fn rollback(&mut self) -> ServiceResult<()> {
        self.staged.clear();
        Ok(())
    }

    fn staged_count(&self) -> usize {
        self.staged.len()
    }
}
