//! Configuration validation module.
//!
//! Fails fast on invalid configuration rather than at runtime, and reports
//! every problem found instead of stopping at the first one.

use crate::{AppConfig, TasksConfig};
use candor_core::TelemetryConfig;
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// The executor pool must have at least one worker.
    ZeroWorkers,
    /// Pool size exceeds maximum allowed.
    WorkersTooLarge { value: usize, maximum: usize },
    /// Timeout value must be positive.
    NonPositiveTimeout { name: String, value: u64 },
    /// Log filter cannot be empty.
    EmptyLogLevel,
    /// Mail port is invalid.
    InvalidMailPort { value: u16 },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroWorkers => write!(f, "Task executor needs at least one worker"),
            Self::WorkersTooLarge { value, maximum } => {
                write!(
                    f,
                    "Task worker count {} exceeds maximum allowed ({})",
                    value, maximum
                )
            }
            Self::NonPositiveTimeout { name, value } => {
                write!(f, "Timeout '{}' must be positive, got {}", name, value)
            }
            Self::EmptyLogLevel => write!(f, "Log level filter cannot be empty"),
            Self::InvalidMailPort { value } => {
                write!(f, "Invalid mail port: {} (must be 1-65535)", value)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Maximum executor pool size.
    const MAX_WORKERS: usize = 256;

    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_tasks(&config.tasks, &mut errors);
        Self::validate_telemetry(&config.telemetry, &mut errors);

        if config.mail.port == 0 {
            errors.push(ConfigValidationError::InvalidMailPort {
                value: config.mail.port,
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validates background task configuration.
    fn validate_tasks(config: &TasksConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.workers == 0 {
            errors.push(ConfigValidationError::ZeroWorkers);
        } else if config.workers > Self::MAX_WORKERS {
            errors.push(ConfigValidationError::WorkersTooLarge {
                value: config.workers,
                maximum: Self::MAX_WORKERS,
            });
        }

        let timeouts = [
            ("task_timeout_secs", config.task_timeout_secs),
            ("poll_interval_ms", config.poll_interval_ms),
            ("join_timeout_secs", config.join_timeout_secs),
            ("shutdown_timeout_secs", config.shutdown_timeout_secs),
        ];

        for (name, value) in timeouts {
            if value == 0 {
                errors.push(ConfigValidationError::NonPositiveTimeout {
                    name: name.to_string(),
                    value,
                });
            }
        }
    }

    /// Validates logging configuration.
    fn validate_telemetry(config: &TelemetryConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.log_level.trim().is_empty() {
            errors.push(ConfigValidationError::EmptyLogLevel);
        }
    }
}
