//! Error taxonomy shared by the cache layer and the store contracts.
//!
//! A single enum covers everything a caller of the cache can see:
//! domain outcomes that map onto API responses (`NotFound`,
//! `Conflict`, …) and infrastructure failures from Redis or the
//! store. The cache-specific kinds carry enough context to decide,
//! at the call site, whether to surface the error or absorb it and
//! fall through to the store.

use thiserror::Error;

/// Every error Taskora can produce.
#[derive(Error, Debug)]
pub enum TaskoraError {
    /// The requested entity does not exist (or is not visible to the
    /// requesting user).
    #[error("{resource_type} {id} not found")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// The request itself is malformed.
    #[error("invalid input: {0}")]
    Validation(String),

    /// The store rejected a write, e.g. a uniqueness violation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The caller may not perform this operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The relational store failed or is unreachable.
    #[error("store failure: {0}")]
    Database(String),

    /// Redis failed or is unreachable. Read paths absorb this kind
    /// and fall through to the store.
    #[error("redis failure: {0}")]
    Cache(String),

    /// A cached value could not be parsed back into its entity.
    /// Treated as a miss on the read path.
    #[error("unparseable cache entry at '{key}': {message}")]
    CorruptCache { key: String, message: String },

    /// The per-resource lease stayed contended through the whole
    /// retry budget. The write was not attempted.
    #[error("lease not acquired: {0}")]
    LockUnavailable(String),

    /// Startup-time configuration is unusable.
    #[error("bad configuration: {0}")]
    Configuration(String),

    /// A value refused to serialize or deserialize.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A bug or an unclassifiable failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl TaskoraError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) => 400,
            Self::Conflict(_) => 409,
            Self::Unauthorized(_) => 401,
            Self::LockUnavailable(_) => 503,
            Self::Database(_)
            | Self::Cache(_)
            | Self::CorruptCache { .. }
            | Self::Configuration(_)
            | Self::Serialization(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::CorruptCache { .. } => "CORRUPT_CACHE_ENTRY",
            Self::LockUnavailable(_) => "LOCK_UNAVAILABLE",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict<T: Into<String>>(message: T) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a cache error.
    #[must_use]
    pub fn cache<T: Into<String>>(message: T) -> Self {
        Self::Cache(message.into())
    }

    /// Creates a corrupt cache entry error.
    #[must_use]
    pub fn corrupt_cache<K: Into<String>, M: Into<String>>(key: K, message: M) -> Self {
        Self::CorruptCache {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if this error is retriable by the client.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Cache(_) | Self::LockUnavailable(_)
        )
    }

    /// Checks if this error may be absorbed on the cache read path.
    ///
    /// Cache-level unavailability and corrupt entries are treated as a
    /// miss; the caller falls through to the store.
    #[must_use]
    pub const fn is_cache_degradable(&self) -> bool {
        matches!(self, Self::Cache(_) | Self::CorruptCache { .. })
    }
}
