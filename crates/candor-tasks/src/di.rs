//! Dependency injection interfaces for the task manager.
//!
//! Collaborators depend on `Arc<dyn TaskQueueInterface>` rather than on
//! [`TaskManager`] directly, so they can be tested against a mock queue.

use crate::error::TaskResult;
use crate::ledger::{CleanupReport, TaskStatus};
use crate::manager::{TaskManager, TaskStats};
use crate::task::{Task, TaskArgs, TaskBuilder, TaskHandler, TaskId};
use candor_core::Interface;

/// Interface for deferring work to the background.
pub trait TaskQueueInterface: Interface + Send + Sync {
    /// Enqueue a task.
    fn submit(&self, task: Task) -> TaskResult<()>;

    /// Build and enqueue a task.
    fn submit_task(
        &self,
        id: TaskId,
        handler: TaskHandler,
        args: TaskArgs,
        max_retries: u32,
    ) -> TaskResult<()> {
        self.submit(
            Task::builder(id, handler)
                .args(args)
                .max_retries(max_retries)
                .build(),
        )
    }

    /// Start building a task with the default retry budget.
    fn task(&self, id: TaskId, handler: TaskHandler) -> TaskBuilder;

    /// Status of a task id.
    fn task_status(&self, id: &str) -> TaskStatus;

    /// Current counters.
    fn stats(&self) -> TaskStats;

    /// Evict ledger entries older than `hours`.
    fn cleanup_old_tasks(&self, hours: u64) -> CleanupReport;
}

impl TaskQueueInterface for TaskManager {
    fn submit(&self, task: Task) -> TaskResult<()> {
        TaskManager::submit(self, task)
    }

    fn task(&self, id: TaskId, handler: TaskHandler) -> TaskBuilder {
        TaskManager::task(self, id, handler)
    }

    fn task_status(&self, id: &str) -> TaskStatus {
        self.get_task_status(id)
    }

    fn stats(&self) -> TaskStats {
        self.get_stats()
    }

    fn cleanup_old_tasks(&self, hours: u64) -> CleanupReport {
        TaskManager::cleanup_old_tasks(self, hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ManagerConfig;
    use crate::task::handler;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_manager_as_trait_object() {
        let queue: Arc<dyn TaskQueueInterface> =
            Arc::new(TaskManager::new(ManagerConfig::default()));

        queue
            .submit_task(
                TaskId::from("email_upload_1"),
                handler(|_, _| async { Ok(json!(null)) }),
                TaskArgs::new(),
                3,
            )
            .unwrap();

        assert_eq!(queue.stats().queue_size, 1);
        assert_eq!(queue.task_status("email_upload_1"), TaskStatus::NotFound);
    }
}
