//! Candor Tasks - In-process Background Task Manager
//!
//! Decouples slow, failure-prone work (thumbnail generation, outbound
//! mail) from request handling:
//! - Caller-named tasks with bound arguments and a retry budget
//! - A single worker loop feeding a bounded executor pool
//! - Hard per-attempt timeout
//! - Exponential backoff (`base * 2^n`) through one delay scheduler
//! - Ledger of running, completed and failed tasks with age-based cleanup
//! - Explicit application context wrapped around every attempt
//!
//! # Architecture
//!
//! ```text
//!  submit ──► PendingQueue ──► WorkerLoop ──► Dispatcher ──► ExecutorPool
//!                 ▲                              │   (ContextAdapter, timeout)
//!                 │                              ▼
//!           RetryScheduler ◄── retryable ── outcome ──► TaskLedger
//!                                                     (completed / failed)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use candor_tasks::{handler, ManagerConfig, TaskManager};
//! use serde_json::json;
//!
//! let manager = TaskManager::new(ManagerConfig::default());
//! manager.start()?;
//!
//! manager.submit(
//!     manager
//!         .task("thumbnails_42", handler(|args, _ctx| async move {
//!             let submission_id: u64 = args.arg(0)?;
//!             Ok(json!({ "submission_id": submission_id }))
//!         }))
//!         .arg(42)
//!         .max_retries(2)
//!         .build(),
//! )?;
//!
//! manager.stop().await;
//! ```

pub mod config;
pub mod context;
pub mod di;
pub mod error;
pub mod executor;
pub mod global;
pub mod ledger;
pub mod manager;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod task;

mod scheduler;
mod shutdown;
mod worker;

pub use config::{DispatchMode, ManagerConfig, OverflowPolicy};
pub use context::{AppContext, ContextAdapter, ContextGuard, SharedContext, TaskContext};
pub use di::TaskQueueInterface;
pub use error::{TaskError, TaskResult};
pub use executor::ExecutorPool;
pub use ledger::{CleanupReport, CompletedEntry, FailedEntry, TaskLedger, TaskStatus};
pub use manager::{TaskManager, TaskStats};
pub use metrics::{register_metrics, TaskMetrics};
pub use queue::PendingQueue;
pub use retry::RetryPolicy;
pub use task::{
    blocking_handler, handler, Task, TaskArgs, TaskBuilder, TaskFuture, TaskHandler, TaskId,
    TaskInfo, TaskOutput, DEFAULT_MAX_RETRIES,
};

/// Re-export commonly used items
pub mod prelude {
    pub use crate::context::{AppContext, ContextGuard, TaskContext};
    pub use crate::di::TaskQueueInterface;
    pub use crate::task::{blocking_handler, handler, Task, TaskArgs, TaskId};
    pub use crate::{TaskError, TaskManager, TaskResult, TaskStatus};
}
