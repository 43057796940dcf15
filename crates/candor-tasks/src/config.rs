//! Runtime configuration of a task manager.

use candor_config::TasksConfig;
use std::time::Duration;

pub use candor_config::{DispatchMode, OverflowPolicy};

/// Task manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Executor pool size.
    pub workers: usize,

    /// Hard timeout for a single attempt.
    pub task_timeout: Duration,

    /// How long the worker loop blocks on an empty queue.
    pub poll_interval: Duration,

    /// How long `stop` waits for the worker loop to exit.
    pub join_timeout: Duration,

    /// How long `stop` waits for in-flight attempts.
    pub shutdown_timeout: Duration,

    /// Backoff base; the nth retry waits `backoff_base * 2^n`.
    pub backoff_base: Duration,

    /// Retry budget for tasks built through the manager.
    pub default_max_retries: u32,

    /// Pending queue capacity (0 = unbounded).
    pub queue_capacity: usize,

    /// Behaviour of a full bounded queue.
    pub overflow: OverflowPolicy,

    /// Worker loop dispatch behaviour.
    pub dispatch: DispatchMode,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            task_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            join_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(1),
            default_max_retries: 3,
            queue_capacity: 0,
            overflow: OverflowPolicy::Reject,
            dispatch: DispatchMode::Sequential,
        }
    }
}

impl From<&TasksConfig> for ManagerConfig {
    fn from(config: &TasksConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            task_timeout: config.task_timeout(),
            poll_interval: config.poll_interval(),
            join_timeout: config.join_timeout(),
            shutdown_timeout: config.shutdown_timeout(),
            backoff_base: config.backoff_base(),
            default_max_retries: config.default_max_retries,
            queue_capacity: config.queue_capacity,
            overflow: config.overflow,
            dispatch: config.dispatch,
        }
    }
}

impl ManagerConfig {
    /// Sets the executor pool size (at least one).
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Sets the per-attempt timeout.
    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout = timeout;
        self
    }

    /// Sets the queue poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the worker loop join timeout.
    #[must_use]
    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Sets the executor drain timeout.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the backoff base.
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Sets the default retry budget.
    #[must_use]
    pub fn with_default_max_retries(mut self, max_retries: u32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Bounds the pending queue.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize, overflow: OverflowPolicy) -> Self {
        self.queue_capacity = capacity;
        self.overflow = overflow;
        self
    }

    /// Sets the dispatch mode.
    #[must_use]
    pub fn with_dispatch(mut self, dispatch: DispatchMode) -> Self {
        self.dispatch = dispatch;
        self
    }
}
