//! Metrics for the background task manager.
//!
//! Recorded through the `metrics` facade; whichever recorder the binary
//! installs (if any) receives them. Task ids are deliberately not used as
//! labels since they are unbounded.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names.
pub mod names {
    /// Total tasks accepted by `submit`.
    pub const TASKS_SUBMITTED_TOTAL: &str = "candor_tasks_submitted_total";
    /// Total attempts started.
    pub const TASKS_STARTED_TOTAL: &str = "candor_tasks_started_total";
    /// Total tasks completed successfully.
    pub const TASKS_COMPLETED_TOTAL: &str = "candor_tasks_completed_total";
    /// Total tasks that failed terminally.
    pub const TASKS_FAILED_TOTAL: &str = "candor_tasks_failed_total";
    /// Total retries scheduled.
    pub const TASKS_RETRIED_TOTAL: &str = "candor_tasks_retried_total";
    /// Total attempts that hit the hard timeout.
    pub const TASKS_TIMED_OUT_TOTAL: &str = "candor_tasks_timed_out_total";
    /// Total submissions refused by a full queue.
    pub const TASKS_REJECTED_TOTAL: &str = "candor_tasks_rejected_total";
    /// Total queued tasks evicted by a full queue.
    pub const TASKS_DROPPED_TOTAL: &str = "candor_tasks_dropped_total";

    /// Current pending queue depth.
    pub const TASKS_PENDING: &str = "candor_tasks_pending";
    /// Current executing attempts.
    pub const TASKS_RUNNING: &str = "candor_tasks_running";
    /// Current retries waiting out their backoff.
    pub const TASKS_DELAYED: &str = "candor_tasks_delayed";

    /// Attempt duration in seconds.
    pub const TASK_DURATION_SECONDS: &str = "candor_task_duration_seconds";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::TASKS_SUBMITTED_TOTAL, "Total number of tasks submitted");
    describe_counter!(names::TASKS_STARTED_TOTAL, "Total number of task attempts started");
    describe_counter!(
        names::TASKS_COMPLETED_TOTAL,
        "Total number of tasks completed successfully"
    );
    describe_counter!(
        names::TASKS_FAILED_TOTAL,
        "Total number of tasks that exhausted their retries"
    );
    describe_counter!(names::TASKS_RETRIED_TOTAL, "Total number of retries scheduled");
    describe_counter!(
        names::TASKS_TIMED_OUT_TOTAL,
        "Total number of attempts that timed out"
    );
    describe_counter!(
        names::TASKS_REJECTED_TOTAL,
        "Total number of submissions rejected by a full queue"
    );
    describe_counter!(
        names::TASKS_DROPPED_TOTAL,
        "Total number of queued tasks evicted by a full queue"
    );

    describe_gauge!(names::TASKS_PENDING, "Current number of queued tasks");
    describe_gauge!(names::TASKS_RUNNING, "Current number of executing attempts");
    describe_gauge!(
        names::TASKS_DELAYED,
        "Current number of retries waiting for their backoff"
    );

    describe_histogram!(
        names::TASK_DURATION_SECONDS,
        "Task attempt duration in seconds"
    );
}

/// Task metrics recorder.
#[derive(Clone, Copy, Debug)]
pub struct TaskMetrics;

#[allow(clippy::cast_precision_loss)]
impl TaskMetrics {
    /// Record a submission and the resulting queue depth.
    pub fn task_submitted(queue_depth: usize) {
        counter!(names::TASKS_SUBMITTED_TOTAL).increment(1);
        gauge!(names::TASKS_PENDING).set(queue_depth as f64);
    }

    /// Record an attempt starting.
    pub fn task_started(running: usize) {
        counter!(names::TASKS_STARTED_TOTAL).increment(1);
        gauge!(names::TASKS_RUNNING).set(running as f64);
    }

    /// Record a successful attempt.
    pub fn task_completed(duration: Duration) {
        counter!(names::TASKS_COMPLETED_TOTAL).increment(1);
        histogram!(names::TASK_DURATION_SECONDS, "status" => "completed")
            .record(duration.as_secs_f64());
    }

    /// Record a failed attempt that will be retried.
    pub fn task_retried(retry: u32, duration: Duration) {
        counter!(names::TASKS_RETRIED_TOTAL, "retry" => retry.to_string()).increment(1);
        histogram!(names::TASK_DURATION_SECONDS, "status" => "retrying")
            .record(duration.as_secs_f64());
    }

    /// Record a terminal failure.
    pub fn task_failed(error_type: &'static str, duration: Duration) {
        counter!(names::TASKS_FAILED_TOTAL, "error_type" => error_type).increment(1);
        histogram!(names::TASK_DURATION_SECONDS, "status" => "failed")
            .record(duration.as_secs_f64());
    }

    /// Record an attempt hitting the hard timeout.
    pub fn task_timed_out() {
        counter!(names::TASKS_TIMED_OUT_TOTAL).increment(1);
    }

    /// Record a submission refused by a full queue.
    pub fn task_rejected() {
        counter!(names::TASKS_REJECTED_TOTAL).increment(1);
    }

    /// Record a queued task evicted by a full queue.
    pub fn task_dropped() {
        counter!(names::TASKS_DROPPED_TOTAL).increment(1);
    }

    /// Update the point-in-time gauges.
    pub fn update_gauges(pending: usize, running: usize, delayed: usize) {
        gauge!(names::TASKS_PENDING).set(pending as f64);
        gauge!(names::TASKS_RUNNING).set(running as f64);
        gauge!(names::TASKS_DELAYED).set(delayed as f64);
    }
}
