//! Error types for cache operations

use thiserror::Error;

/// Main error type for all cache operations
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Backend construction or connectivity probe failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Descriptor or driver configuration is invalid
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A get/put/forget call failed against a resolved backend
    #[error("backend error: {0}")]
    Backend(String),

    /// Both the primary and the fallback failed within one logical call
    #[error("backend unavailable: primary failed ({primary}), fallback failed ({fallback})")]
    BackendUnavailable {
        primary: Box<CacheError>,
        fallback: Box<CacheError>,
    },

    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),

    /// Timeout
    #[error("operation timed out")]
    Timeout,
}

impl CacheError {
    /// Whether this error, raised by the primary backend, should trip failover.
    ///
    /// Configuration problems surface immediately and a `BackendUnavailable`
    /// has already been through a failover attempt.
    pub fn triggers_failover(&self) -> bool {
        !matches!(
            self,
            CacheError::Configuration(_) | CacheError::BackendUnavailable { .. }
        )
    }

    /// Combine a primary failure and a fallback failure from the same call
    pub fn unavailable(primary: CacheError, fallback: CacheError) -> Self {
        CacheError::BackendUnavailable {
            primary: Box::new(primary),
            fallback: Box::new(fallback),
        }
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
