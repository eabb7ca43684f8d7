//! Cache, filter and lock error types.

use std::time::Duration;
use thiserror::Error;

/// Cache layer operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Backend(String),

    #[error("wrong value type for key: {0}")]
    WrongType(String),

    #[error("existence filter not initialized: {0}")]
    FilterNotInitialized(String),

    #[error("lock {key} not acquired within {waited:?}")]
    LockTimeout { key: String, waited: Duration },

    #[error("configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Whether the failure is a backend outage rather than a caller mistake.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Result type for cache, filter and lock operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
