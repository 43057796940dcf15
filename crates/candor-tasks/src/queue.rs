//! In-memory pending queue.

use crate::config::OverflowPolicy;
use crate::error::{TaskError, TaskResult};
use crate::task::Task;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

/// FIFO of tasks waiting to be dispatched.
///
/// `push` never blocks. With a capacity of zero the queue is unbounded;
/// otherwise the overflow policy decides what a full queue does.
#[derive(Debug)]
pub struct PendingQueue {
    items: Mutex<VecDeque<Task>>,
    notify: Notify,
    capacity: usize,
    overflow: OverflowPolicy,
}

impl PendingQueue {
    /// Creates a queue. `capacity == 0` means unbounded.
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity,
            overflow,
        }
    }

    /// Creates an unbounded queue.
    pub fn unbounded() -> Self {
        Self::new(0, OverflowPolicy::Reject)
    }

    /// Appends a new task.
    ///
    /// Under [`OverflowPolicy::DropOldest`] the evicted task is returned so
    /// the caller can report it.
    pub fn push(&self, task: Task) -> TaskResult<Option<Task>> {
        let evicted = {
            let mut items = self.items.lock();
            let evicted = if self.capacity > 0 && items.len() >= self.capacity {
                match self.overflow {
                    OverflowPolicy::Reject => {
                        return Err(TaskError::QueueFull {
                            capacity: self.capacity,
                        })
                    }
                    OverflowPolicy::DropOldest => items.pop_front(),
                }
            } else {
                None
            };
            items.push_back(task);
            evicted
        };

        self.notify.notify_one();
        Ok(evicted)
    }

    /// Puts a retried task at the back, ignoring capacity.
    pub fn requeue(&self, task: Task) {
        self.items.lock().push_back(task);
        self.notify.notify_one();
    }

    /// Takes the front task, waiting up to `wait` for one to arrive.
    pub async fn pop(&self, wait: Duration) -> Option<Task> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(task) = self.try_pop() {
                return Some(task);
            }
            if timeout_at(deadline, self.notify.notified()).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Takes the front task without waiting.
    pub fn try_pop(&self) -> Option<Task> {
        self.items.lock().pop_front()
    }

    /// Number of queued tasks.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Configured capacity (0 = unbounded).
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
