//! Application configuration structures.

use candor_core::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Background task manager configuration.
    #[serde(default)]
    pub tasks: TasksConfig,

    /// Outbound mail configuration.
    #[serde(default)]
    pub mail: MailConfig,

    /// Upload storage configuration.
    #[serde(default)]
    pub uploads: UploadConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    pub name: String,
    /// Application version.
    pub version: String,
    /// Environment (development, staging, production).
    pub environment: String,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "candor".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: "development".to_string(),
        }
    }
}

/// What happens when a bounded pending queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the new task.
    #[default]
    Reject,
    /// Evict the oldest queued task to make room.
    DropOldest,
}

/// How the worker loop hands dequeued tasks to the executor pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Await each task's attempt before dequeuing the next one.
    #[default]
    Sequential,
    /// Dequeue as soon as an executor slot is free.
    Concurrent,
}

/// Background task manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Size of the executor pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Hard timeout for a single attempt, in seconds.
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,

    /// How long the worker loop blocks on an empty queue, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How long `stop` waits for the worker loop to exit, in seconds.
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,

    /// How long `stop` waits for in-flight attempts, in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Base of the exponential backoff, in milliseconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Retry budget used when a caller does not specify one.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Maximum pending queue length (0 = unlimited).
    #[serde(default)]
    pub queue_capacity: usize,

    /// Overflow behaviour of a bounded queue.
    #[serde(default)]
    pub overflow: OverflowPolicy,

    /// Dispatch behaviour of the worker loop.
    #[serde(default)]
    pub dispatch: DispatchMode,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            task_timeout_secs: default_task_timeout(),
            poll_interval_ms: default_poll_interval(),
            join_timeout_secs: default_join_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            backoff_base_ms: default_backoff_base(),
            default_max_retries: default_max_retries(),
            queue_capacity: 0,
            overflow: OverflowPolicy::default(),
            dispatch: DispatchMode::default(),
        }
    }
}

fn default_workers() -> usize {
    4
}

fn default_task_timeout() -> u64 {
    300 // 5 minutes
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_join_timeout() -> u64 {
    5
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    3
}

impl TasksConfig {
    /// Returns the attempt timeout as Duration.
    #[must_use]
    pub const fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    /// Returns the queue poll interval as Duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns the worker loop join timeout as Duration.
    #[must_use]
    pub const fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    /// Returns the executor drain timeout as Duration.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Returns the backoff base as Duration.
    #[must_use]
    pub const fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

/// Outbound mail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// SMTP relay host.
    #[serde(default)]
    pub server: Option<String>,
    /// SMTP relay port.
    #[serde(default = "default_mail_port")]
    pub port: u16,
    /// Use STARTTLS.
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
    /// Relay account name.
    #[serde(default)]
    pub username: Option<String>,
    /// Sender used when a message does not set one.
    #[serde(default)]
    pub default_sender: Option<String>,
    /// Recipient of moderation notifications.
    #[serde(default)]
    pub admin_recipient: Option<String>,
    /// Public base URL used in notification links.
    #[serde(default)]
    pub site_url: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            server: None,
            port: default_mail_port(),
            use_tls: default_use_tls(),
            username: None,
            default_sender: None,
            admin_recipient: None,
            site_url: None,
        }
    }
}

fn default_mail_port() -> u16 {
    587
}

fn default_use_tls() -> bool {
    true
}

impl MailConfig {
    /// Sender address: explicit default sender, else the relay account.
    #[must_use]
    pub fn sender(&self) -> Option<&str> {
        self.default_sender.as_deref().or(self.username.as_deref())
    }

    /// Admin notification recipient: explicit recipient, else the relay
    /// account, else the default sender.
    #[must_use]
    pub fn admin(&self) -> Option<&str> {
        self.admin_recipient
            .as_deref()
            .or(self.username.as_deref())
            .or(self.default_sender.as_deref())
    }
}

/// Upload storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Root directory for uploaded files.
    #[serde(default = "default_upload_dir")]
    pub base_dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_dir: default_upload_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

impl UploadConfig {
    /// Directory where thumbnails and placeholders are written.
    #[must_use]
    pub fn thumbnail_dir(&self) -> PathBuf {
        self.base_dir.join("thumbnails")
    }
}
