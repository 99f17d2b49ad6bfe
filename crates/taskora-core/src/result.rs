//! Result type aliases for Taskora.

use crate::TaskoraError;

/// A specialized `Result` type for Taskora operations.
pub type TaskoraResult<T> = Result<T, TaskoraError>;
