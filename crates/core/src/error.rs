//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid short identifier: {0}")]
    InvalidShortUri(String),

    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("invalid full short url: {0}")]
    InvalidFullShortUrl(String),

    #[error("invalid origin url: {0}")]
    InvalidOriginUrl(String),

    #[error("invalid validity: {0}")]
    InvalidValidity(String),

    #[error("invalid enable status code: {0}")]
    InvalidStatus(i64),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
