//! Task manager facade.

use crate::config::ManagerConfig;
use crate::context::{ContextAdapter, SharedContext};
use crate::error::{TaskError, TaskResult};
use crate::executor::ExecutorPool;
use crate::ledger::{CleanupReport, TaskLedger, TaskStatus};
use crate::metrics::TaskMetrics;
use crate::queue::PendingQueue;
use crate::retry::RetryPolicy;
use crate::scheduler::RetryScheduler;
use crate::shutdown::Shutdown;
use crate::task::{Task, TaskArgs, TaskBuilder, TaskHandler, TaskId};
use crate::worker::{Dispatcher, WorkerLoop};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Point-in-time counters. Not transactionally consistent with
/// concurrent mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Tasks waiting in the pending queue.
    pub queue_size: usize,
    /// Attempts executing right now.
    pub running_count: usize,
    /// Completed ledger size.
    pub completed_count: usize,
    /// Failed ledger size.
    pub failed_count: usize,
    /// Retries waiting out their backoff.
    pub delayed_count: usize,
}

/// Handles of a started manager.
struct RuntimeHandles {
    shutdown: Shutdown,
    worker: JoinHandle<()>,
    scheduler: JoinHandle<()>,
}

/// In-process background task manager.
///
/// Owns the pending queue, the ledger, the executor pool and the
/// lifecycle of the worker loop. Construct one at startup and share it
/// (as `Arc<TaskManager>` or `Arc<dyn TaskQueueInterface>`) with every
/// component that needs to defer work.
pub struct TaskManager {
    id: String,
    config: ManagerConfig,
    queue: Arc<PendingQueue>,
    ledger: Arc<TaskLedger>,
    pool: Arc<ExecutorPool>,
    adapter: Arc<ContextAdapter>,
    retry: RetryPolicy,
    delayed: Arc<AtomicUsize>,
    runtime: Mutex<Option<RuntimeHandles>>,
}

impl TaskManager {
    /// Creates a stopped manager.
    pub fn new(config: ManagerConfig) -> Self {
        Self::build(config, None)
    }

    /// Creates a stopped manager bound to an application context.
    pub fn with_context(config: ManagerConfig, context: SharedContext) -> Self {
        Self::build(config, Some(context))
    }

    fn build(config: ManagerConfig, context: Option<SharedContext>) -> Self {
        Self {
            id: format!("task-manager-{}", Uuid::new_v4()),
            queue: Arc::new(PendingQueue::new(config.queue_capacity, config.overflow)),
            ledger: Arc::new(TaskLedger::new()),
            pool: Arc::new(ExecutorPool::new(config.workers)),
            adapter: Arc::new(ContextAdapter::new(context)),
            retry: RetryPolicy::exponential(config.backoff_base),
            delayed: Arc::new(AtomicUsize::new(0)),
            runtime: Mutex::new(None),
            config,
        }
    }

    /// Manager instance id, used in logs.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Ledger backing `get_task_status`, for inspection and maintenance.
    #[must_use]
    pub fn ledger(&self) -> &TaskLedger {
        &self.ledger
    }

    /// Starts the worker loop and the retry scheduler.
    ///
    /// Idempotent while running; starts afresh after [`stop`](Self::stop).
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> TaskResult<()> {
        let mut runtime = self.runtime.lock();
        if runtime.is_some() {
            debug!(manager_id = %self.id, "Task manager already running");
            return Ok(());
        }

        tokio::runtime::Handle::try_current()
            .map_err(|e| TaskError::Internal(format!("no tokio runtime: {e}")))?;

        let shutdown = Shutdown::new();
        let (scheduler, scheduler_handle) =
            RetryScheduler::spawn(Arc::clone(&self.queue), &shutdown, Arc::clone(&self.delayed));

        let dispatcher = Dispatcher {
            pool: Arc::clone(&self.pool),
            ledger: Arc::clone(&self.ledger),
            adapter: Arc::clone(&self.adapter),
            retry: self.retry,
            scheduler,
            task_timeout: self.config.task_timeout,
        };

        let worker = WorkerLoop {
            queue: Arc::clone(&self.queue),
            dispatcher: Arc::new(dispatcher),
            shutdown: shutdown.clone(),
            poll_interval: self.config.poll_interval,
            mode: self.config.dispatch,
            workers: self.config.workers,
        };
        let worker_handle = tokio::spawn(worker.run(shutdown.subscribe()));

        *runtime = Some(RuntimeHandles {
            shutdown,
            worker: worker_handle,
            scheduler: scheduler_handle,
        });

        info!(
            manager_id = %self.id,
            workers = self.config.workers,
            dispatch = ?self.config.dispatch,
            pending = self.queue.len(),
            "Task manager started"
        );
        Ok(())
    }

    /// Stops the manager.
    ///
    /// Signals the worker loop, waits up to `join_timeout` for it and the
    /// retry scheduler to exit, then waits up to `shutdown_timeout` for
    /// in-flight attempts. Queued tasks are left in place (a later
    /// `start` picks them up); retries still waiting out their delay are
    /// discarded. Running attempts are never cancelled.
    pub async fn stop(&self) {
        let handles = self.runtime.lock().take();
        let Some(handles) = handles else {
            debug!(manager_id = %self.id, "Task manager not running");
            return;
        };

        info!(manager_id = %self.id, "Stopping task manager");
        handles.shutdown.trigger();

        match timeout(self.config.join_timeout, handles.worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Worker loop ended abnormally"),
            Err(_) => warn!(
                join_timeout_ms = duration_ms(self.config.join_timeout),
                "Worker loop did not exit in time"
            ),
        }

        match timeout(self.config.join_timeout, handles.scheduler).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Retry scheduler ended abnormally"),
            Err(_) => warn!("Retry scheduler did not exit in time"),
        }

        if !self.pool.drain(self.config.shutdown_timeout).await {
            warn!(
                in_flight = self.pool.in_flight(),
                "Attempts still running after shutdown timeout"
            );
        }

        let pending = self.queue.len();
        if pending > 0 {
            warn!(pending, "Stopped with tasks still queued");
        }

        info!(manager_id = %self.id, "Task manager stopped");
    }

    /// True between `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// Late-binds an application context if none is attached yet.
    pub fn attach_context(&self, context: SharedContext) -> bool {
        let attached = self.adapter.attach(context);
        if attached {
            info!(manager_id = %self.id, "Application context attached");
        }
        attached
    }

    /// Currently attached application context.
    #[must_use]
    pub fn context(&self) -> Option<SharedContext> {
        self.adapter.current()
    }

    /// Starts a task with this manager's default retry budget.
    pub fn task(&self, id: impl Into<TaskId>, handler: TaskHandler) -> TaskBuilder {
        Task::builder(id, handler).max_retries(self.config.default_max_retries)
    }

    /// Enqueues a task. Never blocks.
    ///
    /// Fails only when a bounded queue rejects the task. A stopped
    /// manager still accepts the task; it runs after the next `start`.
    pub fn submit(&self, task: Task) -> TaskResult<()> {
        let id = task.id().clone();
        let max_retries = task.max_retries();

        if !self.is_running() {
            warn!(task_id = %id, "Task submitted while manager is stopped");
        }

        match self.queue.push(task) {
            Ok(evicted) => {
                if let Some(evicted) = evicted {
                    TaskMetrics::task_dropped();
                    warn!(
                        task_id = %evicted.id(),
                        capacity = self.queue.capacity(),
                        "Queue full, oldest pending task dropped"
                    );
                }
                let queue_size = self.queue.len();
                TaskMetrics::task_submitted(queue_size);
                info!(task_id = %id, max_retries, queue_size, "Task submitted");
                Ok(())
            }
            Err(err) => {
                TaskMetrics::task_rejected();
                warn!(task_id = %id, error = %err, "Task rejected");
                Err(err)
            }
        }
    }

    /// Builds and enqueues a task in one call.
    pub fn submit_task(
        &self,
        id: impl Into<TaskId>,
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

    /// Status of `id`: running, completed, failed or not found.
    #[must_use]
    pub fn get_task_status(&self, id: &str) -> TaskStatus {
        self.ledger.status(id)
    }

    /// Current counters.
    #[must_use]
    pub fn get_stats(&self) -> TaskStats {
        let stats = self.snapshot();
        TaskMetrics::update_gauges(stats.queue_size, stats.running_count, stats.delayed_count);
        stats
    }

    fn snapshot(&self) -> TaskStats {
        TaskStats {
            queue_size: self.queue.len(),
            running_count: self.ledger.running_count(),
            completed_count: self.ledger.completed_count(),
            failed_count: self.ledger.failed_count(),
            delayed_count: self.delayed.load(Ordering::SeqCst),
        }
    }

    /// Evicts completed and failed entries older than `hours`.
    ///
    /// Running and queued tasks are untouched.
    pub fn cleanup_old_tasks(&self, hours: u64) -> CleanupReport {
        let cutoff = i64::try_from(hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let report = self.ledger.evict_older_than(cutoff);
        info!(
            hours,
            completed_removed = report.completed_removed,
            failed_removed = report.failed_removed,
            "Cleaned up old task records"
        );
        report
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        if let Some(handles) = self.runtime.get_mut().take() {
            handles.shutdown.trigger();
        }
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("stats", &self.snapshot())
            .finish_non_exhaustive()
    }
}

fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
