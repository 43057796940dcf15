//! Delay scheduler for retries.
//!
//! A single background task owns every pending retry in a min-heap keyed
//! by due time and sleeps until the earliest one is due, instead of one
//! timer per retry.

use crate::queue::PendingQueue;
use crate::shutdown::Shutdown;
use crate::task::Task;
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};

/// A retry waiting for its due time.
struct Delayed {
    due: Instant,
    seq: u64,
    task: Task,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.due
            .cmp(&other.due)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Handle used by the dispatcher to schedule retries.
#[derive(Debug, Clone)]
pub(crate) struct RetryScheduler {
    tx: mpsc::UnboundedSender<Delayed>,
    delayed: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Delayed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delayed")
            .field("due", &self.due)
            .field("seq", &self.seq)
            .field("task", &self.task.id())
            .finish()
    }
}

impl RetryScheduler {
    /// Spawns the scheduler task.
    ///
    /// `delayed` is the shared counter of retries waiting in the heap.
    pub(crate) fn spawn(
        queue: Arc<PendingQueue>,
        shutdown: &Shutdown,
        delayed: Arc<AtomicUsize>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown_rx = shutdown.subscribe();
        let handle = tokio::spawn(run(
            rx,
            queue,
            shutdown.clone(),
            shutdown_rx,
            Arc::clone(&delayed),
        ));

        (Self { tx, delayed }, handle)
    }

    /// Schedules `task` to re-enter the queue after `delay`.
    ///
    /// Returns false if the scheduler has already stopped; the task is
    /// dropped in that case.
    pub(crate) fn schedule(&self, task: Task, delay: Duration) -> bool {
        let due = Instant::now()
            .checked_add(delay)
            .unwrap_or_else(far_future);
        self.delayed.fetch_add(1, Ordering::SeqCst);

        let entry = Delayed { due, seq: 0, task };
        if self.tx.send(entry).is_err() {
            self.delayed.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }
}

/// Roughly thirty years out, the same horizon tokio uses for "never".
fn far_future() -> Instant {
    Instant::now() + Duration::from_secs(86400 * 365 * 30)
}

async fn wait_until(due: Option<Instant>) {
    match due {
        Some(due) => sleep_until(due).await,
        None => std::future::pending().await,
    }
}

async fn run(
    mut rx: mpsc::UnboundedReceiver<Delayed>,
    queue: Arc<PendingQueue>,
    shutdown: Shutdown,
    mut shutdown_rx: broadcast::Receiver<()>,
    delayed: Arc<AtomicUsize>,
) {
    let mut heap: BinaryHeap<Reverse<Delayed>> = BinaryHeap::new();
    let mut next_seq: u64 = 0;

    debug!("Retry scheduler started");

    while !shutdown.is_triggered() {
        let next_due = heap.peek().map(|Reverse(entry)| entry.due);

        tokio::select! {
            biased;

            _ = shutdown_rx.recv() => break,

            received = rx.recv() => {
                let Some(mut entry) = received else { break };
                entry.seq = next_seq;
                next_seq = next_seq.wrapping_add(1);
                trace!(task_id = %entry.task.id(), "Retry parked");
                heap.push(Reverse(entry));
            }

            () = wait_until(next_due) => {
                let now = Instant::now();
                while heap.peek().is_some_and(|Reverse(entry)| entry.due <= now) {
                    let Some(Reverse(entry)) = heap.pop() else { break };
                    delayed.fetch_sub(1, Ordering::SeqCst);

                    if shutdown.is_triggered() {
                        debug!(task_id = %entry.task.id(), "Shutdown requested, retry not re-enqueued");
                        continue;
                    }

                    debug!(
                        task_id = %entry.task.id(),
                        retry = entry.task.current_retry(),
                        "Retry due, re-enqueueing"
                    );
                    queue.requeue(entry.task);
                }
            }
        }
    }

    rx.close();
    let mut dropped = heap.len();
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    delayed.fetch_sub(dropped, Ordering::SeqCst);

    if dropped > 0 {
        info!(dropped, "Retry scheduler stopped with retries still waiting");
    } else {
        debug!("Retry scheduler stopped");
    }
}
