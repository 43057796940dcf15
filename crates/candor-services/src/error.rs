//! Service error types.

use candor_core::CandorError;
use candor_tasks::TaskError;
use thiserror::Error;

/// Result type for service operations.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors raised by the background jobs and their ports.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No evidence row with this id.
    #[error("Evidence {0} not found")]
    EvidenceNotFound(i64),

    /// Persistence failure (read, write, commit).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Thumbnail or placeholder could not be produced.
    #[error("Render error: {0}")]
    Render(String),

    /// Mail relay refused or dropped the message.
    #[error("Mail delivery failed: {0}")]
    Mail(String),

    /// A message is missing required fields.
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// The task queue refused the work.
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl ServiceError {
    /// Creates a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates a render error.
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<ServiceError> for TaskError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Task(inner) => inner,
            ServiceError::InvalidMessage(msg) => Self::InvalidArguments(msg),
            other => Self::ExecutionFailed(other.to_string()),
        }
    }
}

impl From<ServiceError> for CandorError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::EvidenceNotFound(id) => Self::not_found("evidence", id),
            ServiceError::Storage(msg) => Self::Database(msg),
            ServiceError::Mail(msg) => Self::external("mail", msg),
            ServiceError::InvalidMessage(msg) => Self::validation(msg),
            ServiceError::Render(msg) => Self::Internal(msg),
            ServiceError::Task(inner) => Self::Internal(inner.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_task_error() {
        let err: TaskError = ServiceError::Mail("relay down".into()).into();
        assert_eq!(
            err,
            TaskError::ExecutionFailed("Mail delivery failed: relay down".into())
        );

        let err: TaskError = ServiceError::InvalidMessage("no recipients".into()).into();
        assert_eq!(err.error_code(), "invalid_arguments");

        let full = TaskError::QueueFull { capacity: 8 };
        let err: TaskError = ServiceError::Task(full.clone()).into();
        assert_eq!(err, full);
    }

    #[test]
    fn test_into_candor_error() {
        let err: CandorError = ServiceError::EvidenceNotFound(7).into();
        assert_eq!(err.error_code(), "NOT_FOUND");

        let err: CandorError = ServiceError::storage("commit failed").into();
        assert!(err.is_retriable());

        let err: CandorError = ServiceError::InvalidMessage("no recipients".into()).into();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
        assert!(!err.is_retriable());
    }
}
