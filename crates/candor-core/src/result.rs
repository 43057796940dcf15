//! Result type aliases for Candor.

use crate::CandorError;

/// A specialized `Result` type for Candor operations.
pub type CandorResult<T> = Result<T, CandorError>;
