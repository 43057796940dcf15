//! Bounded executor pool with a hard per-attempt timeout.

use crate::error::{TaskError, TaskResult};
use crate::task::{TaskFuture, TaskOutput};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::warn;

/// Fixed-size pool that runs task attempts.
///
/// Each attempt holds one permit for as long as it actually runs. A
/// timed-out attempt is not cancelled: it keeps running detached and
/// keeps its permit until the callable returns, so a stuck callable
/// permanently shrinks the pool by one.
#[derive(Debug)]
pub struct ExecutorPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl ExecutorPool {
    /// Creates a pool with `size` slots (at least one).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Configured pool size.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Attempts currently holding a slot, including timed-out ones.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.size.saturating_sub(self.semaphore.available_permits())
    }

    /// Runs one attempt and waits at most `limit` for its result.
    ///
    /// The wait covers queuing for a slot as well as execution. A panic
    /// in the attempt comes back as [`TaskError::Panicked`].
    pub async fn run(&self, attempt: TaskFuture, limit: Duration) -> TaskResult<TaskOutput> {
        let semaphore = Arc::clone(&self.semaphore);

        let execution = async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| TaskError::Internal("executor pool closed".to_string()))?;

            let handle = tokio::spawn(async move {
                let _permit = permit;
                attempt.await
            });

            handle.await?
        };

        match timeout(limit, execution).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    in_flight = self.in_flight(),
                    "Attempt timed out; leaving it to finish in the background"
                );
                Err(TaskError::Timeout(limit))
            }
        }
    }

    /// Waits until every slot is free again, up to `limit`.
    ///
    /// Returns true if the pool drained in time.
    pub async fn drain(&self, limit: Duration) -> bool {
        let Ok(permits) = u32::try_from(self.size) else {
            return false;
        };

        matches!(
            timeout(limit, self.semaphore.acquire_many(permits)).await,
            Ok(Ok(_))
        )
    }
}
