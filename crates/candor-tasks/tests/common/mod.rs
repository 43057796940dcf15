//! Shared helpers for task manager integration tests.

#![allow(dead_code)]

use candor_tasks::{handler, ManagerConfig, TaskHandler, TaskManager, TaskStatus};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration with short intervals so tests finish quickly.
///
/// Backoff base 50ms gives retry delays of 100ms, 200ms, 400ms, ...
pub fn fast_config() -> ManagerConfig {
    ManagerConfig::default()
        .with_poll_interval(Duration::from_millis(20))
        .with_backoff_base(Duration::from_millis(50))
        .with_join_timeout(Duration::from_secs(2))
        .with_shutdown_timeout(Duration::from_secs(2))
}

/// A started manager with [`fast_config`].
pub fn started_manager() -> Arc<TaskManager> {
    started_with(fast_config())
}

/// A started manager with the given configuration.
pub fn started_with(config: ManagerConfig) -> Arc<TaskManager> {
    let manager = Arc::new(TaskManager::new(config));
    manager.start().expect("Failed to start manager");
    manager
}

/// Polls `condition` every 10ms until it holds or `limit` elapses.
pub async fn wait_for(limit: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Waits until `id` reaches completed or failed.
pub async fn wait_terminal(manager: &TaskManager, id: &str, limit: Duration) -> TaskStatus {
    wait_for(limit, || manager.get_task_status(id).is_terminal()).await;
    manager.get_task_status(id)
}

/// Handler that counts invocations and always fails.
pub fn always_failing(calls: Arc<AtomicU32>) -> TaskHandler {
    handler(move |_, _| {
        let calls = Arc::clone(&calls);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Err(candor_tasks::TaskError::failed(format!("attempt {n} failed")))
        }
    })
}

/// Handler that returns `"ok"` immediately.
pub fn ok_handler() -> TaskHandler {
    handler(|_, _| async { Ok(json!("ok")) })
}
