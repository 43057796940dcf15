//! Task error types.

use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Result type for task operations.
pub type TaskResult<T> = Result<T, TaskError>;

/// Task-related errors.
///
/// Everything a callable can fail with collapses to one of these. The
/// ledger stores the rendered message, so variants carry strings rather
/// than source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The callable returned an error.
    #[error("Task execution failed: {0}")]
    ExecutionFailed(String),

    /// The attempt exceeded the hard timeout.
    #[error("Task timed out after {0:?}")]
    Timeout(Duration),

    /// The callable panicked.
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// Arguments could not be decoded into the types the callable expects.
    #[error("Invalid task arguments: {0}")]
    InvalidArguments(String),

    /// The bounded pending queue refused the task.
    #[error("Queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TaskError {
    /// Creates an execution failure from anything printable.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::ExecutionFailed(message.into())
    }

    /// Returns true if another attempt could plausibly succeed.
    ///
    /// The dispatcher retries every failure while budget remains; this is
    /// advisory for callers inspecting a terminal error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ExecutionFailed(_) | Self::Timeout(_) | Self::Panicked(_) | Self::Internal(_)
        )
    }

    /// Short label used for metrics and structured logs.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::ExecutionFailed(_) => "execution_failed",
            Self::Timeout(_) => "timeout",
            Self::Panicked(_) => "panicked",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::QueueFull { .. } => "queue_full",
            Self::Configuration(_) => "configuration",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<candor_core::CandorError> for TaskError {
    fn from(err: candor_core::CandorError) -> Self {
        match err {
            candor_core::CandorError::Configuration(msg) => Self::Configuration(msg),
            candor_core::CandorError::Validation(msg) => Self::InvalidArguments(msg),
            other => Self::ExecutionFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for TaskError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidArguments(err.to_string())
    }
}

impl From<tokio::task::JoinError> for TaskError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            Self::Panicked(panic_message(err.into_panic().as_ref()))
        } else {
            Self::Internal("task was cancelled".to_string())
        }
    }
}

/// Extracts the message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display() {
        let err = TaskError::Timeout(Duration::from_secs(300));
        assert_eq!(err.to_string(), "Task timed out after 300s");
        assert_eq!(err.error_code(), "timeout");
    }

    #[test]
    fn test_retryable() {
        assert!(TaskError::failed("smtp down").is_retryable());
        assert!(TaskError::Panicked("boom".into()).is_retryable());
        assert!(!TaskError::InvalidArguments("expected int".into()).is_retryable());
        assert!(!TaskError::QueueFull { capacity: 8 }.is_retryable());
    }

    #[test]
    fn test_from_candor_error() {
        let err = TaskError::from(candor_core::CandorError::external("smtp", "refused"));
        match err {
            TaskError::ExecutionFailed(msg) => assert!(msg.contains("refused")),
            other => panic!("unexpected variant: {other:?}"),
        }

        let err = TaskError::from(candor_core::CandorError::Configuration("no relay".into()));
        assert_eq!(err, TaskError::Configuration("no relay".into()));

        let err = TaskError::from(candor_core::CandorError::validation("missing recipient"));
        assert_eq!(err, TaskError::InvalidArguments("missing recipient".into()));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_panic_message_payloads() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(payload.as_ref()), "static str");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_from_join_error_panic() {
        let handle = tokio::spawn(async { panic!("callable exploded") });
        let err = TaskError::from(handle.await.unwrap_err());
        assert_eq!(err, TaskError::Panicked("callable exploded".into()));
    }
}
