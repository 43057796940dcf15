//! Worker loop and per-task dispatch.

use crate::config::DispatchMode;
use crate::context::ContextAdapter;
use crate::error::{panic_message, TaskError};
use crate::executor::ExecutorPool;
use crate::ledger::TaskLedger;
use crate::metrics::TaskMetrics;
use crate::queue::PendingQueue;
use crate::retry::RetryPolicy;
use crate::scheduler::RetryScheduler;
use crate::shutdown::Shutdown;
use crate::task::Task;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TaskOutcome {
    Succeeded,
    Retrying { retry: u32, delay: Duration },
    Failed,
}

/// Runs single attempts and applies the retry state machine.
pub(crate) struct Dispatcher {
    pub(crate) pool: Arc<ExecutorPool>,
    pub(crate) ledger: Arc<TaskLedger>,
    pub(crate) adapter: Arc<ContextAdapter>,
    pub(crate) retry: RetryPolicy,
    pub(crate) scheduler: RetryScheduler,
    pub(crate) task_timeout: Duration,
}

impl Dispatcher {
    /// One attempt: running, then succeeded, retrying or failed.
    pub(crate) async fn dispatch(&self, task: Task) -> TaskOutcome {
        let span = info_span!("task", task_id = %task.id(), attempt = task.attempt());
        self.dispatch_inner(task).instrument(span).await
    }

    async fn dispatch_inner(&self, task: Task) -> TaskOutcome {
        self.ledger.mark_running(task.info());
        TaskMetrics::task_started(self.ledger.running_count());
        info!(max_retries = task.max_retries(), "Task started");

        let started = Instant::now();
        let result = self
            .pool
            .run(self.adapter.wrap(&task), self.task_timeout)
            .await;
        let elapsed = started.elapsed();

        match result {
            Ok(output) => {
                self.ledger.record_completed(task.info(), output);
                self.ledger.clear_running(task.id());
                TaskMetrics::task_completed(elapsed);
                info!(
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    "Task completed"
                );
                TaskOutcome::Succeeded
            }
            Err(err) => {
                if matches!(err, TaskError::Timeout(_)) {
                    TaskMetrics::task_timed_out();
                }
                self.handle_failure(task, &err, elapsed)
            }
        }
    }

    fn handle_failure(&self, mut task: Task, err: &TaskError, elapsed: Duration) -> TaskOutcome {
        if self
            .retry
            .should_retry(task.current_retry(), task.max_retries())
            && task.increment_retry()
        {
            let retry = task.current_retry();
            let delay = self.retry.delay_for_retry(retry);
            self.ledger.clear_running(task.id());
            TaskMetrics::task_retried(retry, elapsed);

            warn!(
                retry,
                max_retries = task.max_retries(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "Task failed, retry scheduled"
            );

            let id = task.id().clone();
            if !self.scheduler.schedule(task, delay) {
                warn!(task_id = %id, "Manager stopping, retry discarded");
            }
            return TaskOutcome::Retrying { retry, delay };
        }

        self.ledger.record_failed(task.info(), err.to_string());
        self.ledger.clear_running(task.id());
        TaskMetrics::task_failed(err.error_code(), elapsed);

        error!(
            retry = task.current_retry(),
            max_retries = task.max_retries(),
            error = %err,
            "Task failed permanently"
        );
        TaskOutcome::Failed
    }
}

/// Dispatches `task`, absorbing any panic that escapes the dispatcher.
pub(crate) async fn run_guarded(dispatcher: &Dispatcher, task: Task) {
    let id = task.id().clone();
    match AssertUnwindSafe(dispatcher.dispatch(task))
        .catch_unwind()
        .await
    {
        Ok(TaskOutcome::Retrying { retry, delay }) => trace!(
            task_id = %id,
            retry,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Attempt ended, retry pending"
        ),
        Ok(outcome) => trace!(task_id = %id, ?outcome, "Attempt ended"),
        Err(payload) => {
            dispatcher.ledger.clear_running(&id);
            error!(
                task_id = %id,
                panic = %panic_message(payload.as_ref()),
                "Dispatch panicked, worker loop continues"
            );
        }
    }
}

/// The dedicated loop that pulls tasks off the pending queue.
pub(crate) struct WorkerLoop {
    pub(crate) queue: Arc<PendingQueue>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) shutdown: Shutdown,
    pub(crate) poll_interval: Duration,
    pub(crate) mode: DispatchMode,
    pub(crate) workers: usize,
}

impl WorkerLoop {
    /// Runs until shutdown is triggered.
    ///
    /// In sequential mode each task's whole attempt completes before the
    /// next dequeue. In concurrent mode the loop first takes one of
    /// `workers` dispatch slots, then dequeues and hands the task off.
    /// Either way every dequeued task has finished its dispatch when this
    /// returns.
    pub(crate) async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        let slots = Arc::new(Semaphore::new(self.workers.max(1)));
        let mut dispatches = JoinSet::new();
        info!(mode = ?self.mode, workers = self.workers, "Worker loop started");

        while !self.shutdown.is_triggered() {
            while let Some(done) = dispatches.try_join_next() {
                log_dispatch_join(done);
            }

            let slot = match self.mode {
                DispatchMode::Sequential => None,
                DispatchMode::Concurrent => {
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => break,
                        permit = Arc::clone(&slots).acquire_owned() => match permit {
                            Ok(permit) => Some(permit),
                            Err(_) => break,
                        },
                    }
                }
            };

            let next = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                next = self.queue.pop(self.poll_interval) => next,
            };

            let Some(task) = next else {
                trace!("Queue idle");
                continue;
            };

            debug!(task_id = %task.id(), pending = self.queue.len(), "Dequeued task");

            match slot {
                Some(slot) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    dispatches.spawn(async move {
                        let _slot = slot;
                        run_guarded(&dispatcher, task).await;
                    });
                }
                None => run_guarded(&self.dispatcher, task).await,
            }
        }

        if !dispatches.is_empty() {
            debug!(in_flight = dispatches.len(), "Waiting for dispatches");
        }
        while let Some(done) = dispatches.join_next().await {
            log_dispatch_join(done);
        }

        info!("Worker loop stopped");
    }
}

fn log_dispatch_join(done: Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        error!(error = %e, "Dispatch task ended abnormally");
    }
}
