//! In-memory record of running, completed and failed tasks.

use crate::task::{TaskId, TaskInfo, TaskOutput};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A successful final attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedEntry {
    pub task: TaskInfo,
    pub result: TaskOutput,
    pub completed_at: DateTime<Utc>,
}

/// A task whose retry budget ran out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub task: TaskInfo,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Status of a task id as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskStatus {
    /// An attempt is executing.
    Running { task: TaskInfo },

    /// The task finished successfully.
    Completed {
        task: TaskInfo,
        result: TaskOutput,
        completed_at: DateTime<Utc>,
    },

    /// The task failed terminally.
    Failed {
        task: TaskInfo,
        error: String,
        failed_at: DateTime<Utc>,
    },

    /// Unknown id, still queued, or waiting out a backoff delay.
    NotFound,
}

impl TaskStatus {
    /// Status name as serialized.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Running { .. } => "running",
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::NotFound => "not_found",
        }
    }

    /// True for completed or failed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }

    /// Result of a completed task.
    #[must_use]
    pub fn result(&self) -> Option<&TaskOutput> {
        match self {
            Self::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    /// Error of a failed task.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Task snapshot, if the id is known.
    #[must_use]
    pub fn task(&self) -> Option<&TaskInfo> {
        match self {
            Self::Running { task } | Self::Completed { task, .. } | Self::Failed { task, .. } => {
                Some(task)
            }
            Self::NotFound => None,
        }
    }
}

impl From<CompletedEntry> for TaskStatus {
    fn from(entry: CompletedEntry) -> Self {
        Self::Completed {
            task: entry.task,
            result: entry.result,
            completed_at: entry.completed_at,
        }
    }
}

impl From<FailedEntry> for TaskStatus {
    fn from(entry: FailedEntry) -> Self {
        Self::Failed {
            task: entry.task,
            error: entry.error,
            failed_at: entry.failed_at,
        }
    }
}

/// Outcome of an eviction pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub completed_removed: usize,
    pub failed_removed: usize,
}

impl CleanupReport {
    /// Total entries removed.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.completed_removed + self.failed_removed
    }
}

/// Running set plus completed and failed ledgers, keyed by task id.
///
/// Every map is last-write-wins. The running set only ever holds tasks
/// with an attempt in progress.
#[derive(Debug, Default)]
pub struct TaskLedger {
    running: RwLock<HashMap<TaskId, TaskInfo>>,
    completed: RwLock<HashMap<TaskId, CompletedEntry>>,
    failed: RwLock<HashMap<TaskId, FailedEntry>>,
}

impl TaskLedger {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an attempt as executing.
    pub fn mark_running(&self, task: TaskInfo) {
        self.running.write().insert(task.id.clone(), task);
    }

    /// Removes a task from the running set.
    pub fn clear_running(&self, id: &TaskId) {
        self.running.write().remove(id);
    }

    /// Records a completion at the current time.
    pub fn record_completed(&self, task: TaskInfo, result: TaskOutput) {
        self.record_completed_at(task, result, Utc::now());
    }

    /// Records a completion at an explicit time.
    pub fn record_completed_at(&self, task: TaskInfo, result: TaskOutput, at: DateTime<Utc>) {
        self.completed.write().insert(
            task.id.clone(),
            CompletedEntry {
                task,
                result,
                completed_at: at,
            },
        );
    }

    /// Records a terminal failure at the current time.
    pub fn record_failed(&self, task: TaskInfo, error: impl Into<String>) {
        self.record_failed_at(task, error, Utc::now());
    }

    /// Records a terminal failure at an explicit time.
    pub fn record_failed_at(&self, task: TaskInfo, error: impl Into<String>, at: DateTime<Utc>) {
        self.failed.write().insert(
            task.id.clone(),
            FailedEntry {
                task,
                error: error.into(),
                failed_at: at,
            },
        );
    }

    /// Looks up `id`: running first, then completed, then failed.
    pub fn status(&self, id: &str) -> TaskStatus {
        if let Some(task) = self.running.read().get(id) {
            return TaskStatus::Running { task: task.clone() };
        }
        if let Some(entry) = self.completed.read().get(id) {
            return entry.clone().into();
        }
        if let Some(entry) = self.failed.read().get(id) {
            return entry.clone().into();
        }
        TaskStatus::NotFound
    }

    /// Number of executing attempts.
    pub fn running_count(&self) -> usize {
        self.running.read().len()
    }

    /// Number of completed entries.
    pub fn completed_count(&self) -> usize {
        self.completed.read().len()
    }

    /// Number of failed entries.
    pub fn failed_count(&self) -> usize {
        self.failed.read().len()
    }

    /// Evicts completed and failed entries stamped strictly before
    /// `cutoff`. The running set is never touched.
    pub fn evict_older_than(&self, cutoff: DateTime<Utc>) -> CleanupReport {
        let completed_removed = {
            let mut completed = self.completed.write();
            let before = completed.len();
            completed.retain(|_, entry| entry.completed_at >= cutoff);
            before - completed.len()
        };

        let failed_removed = {
            let mut failed = self.failed.write();
            let before = failed.len();
            failed.retain(|_, entry| entry.failed_at >= cutoff);
            before - failed.len()
        };

        CleanupReport {
            completed_removed,
            failed_removed,
        }
    }
}
