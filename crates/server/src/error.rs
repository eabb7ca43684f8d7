//! Resolution and API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use shortlink_cache::CacheError;
use shortlink_metadata::{MetadataError, QueryError};
use std::time::Duration;

/// Outcome classification for resolution and link lifecycle calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// No eligible record. Covers absent, filtered, negatively cached,
    /// disabled, expired and soft-deleted links alike.
    #[error("short link not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("lock {key} not acquired within {waited:?}")]
    LockTimeout { key: String, waited: Duration },

    #[error("query build error: {0}")]
    QueryBuild(String),

    #[error("keyword collision: {0}")]
    KeywordCollision(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ResolveError {
    /// Whether a caller may reasonably retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. } | Self::UpstreamUnavailable(_))
    }
}

impl From<CacheError> for ResolveError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::LockTimeout { key, waited } => Self::LockTimeout { key, waited },
            CacheError::Backend(_) | CacheError::FilterNotInitialized(_) => {
                Self::UpstreamUnavailable(err.to_string())
            }
            CacheError::WrongType(_) | CacheError::Config(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<QueryError> for ResolveError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::KeywordCollision { .. } | QueryError::InvalidIdentifier { .. } => {
                Self::KeywordCollision(err.to_string())
            }
            QueryError::Build(message) => Self::QueryBuild(message),
        }
    }
}

impl From<MetadataError> for ResolveError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(_) => Self::NotFound,
            MetadataError::AlreadyExists(what) => Self::Conflict(what),
            MetadataError::Database(e) => Self::UpstreamUnavailable(format!("link store: {e}")),
            MetadataError::Query(e) => e.into(),
            MetadataError::Core(e) => Self::Internal(format!("corrupt link record: {e}")),
            MetadataError::Config(m) | MetadataError::Internal(m) => Self::Internal(m),
        }
    }
}

impl From<shortlink_core::Error> for ResolveError {
    fn from(err: shortlink_core::Error) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

/// Result type for resolution and link lifecycle calls.
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
            Self::Resolve(e) => match e {
                ResolveError::NotFound => "not_found",
                ResolveError::Conflict(_) => "conflict",
                ResolveError::LockTimeout { .. } => "lock_timeout",
                ResolveError::QueryBuild(_) => "query_build_error",
                ResolveError::KeywordCollision(_) => "keyword_collision",
                ResolveError::InvalidInput(_) => "bad_request",
                ResolveError::UpstreamUnavailable(_) => "upstream_unavailable",
                ResolveError::Internal(_) => "internal_error",
            },
            Self::Metadata(_) => "metadata_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Resolve(e) => match e {
                ResolveError::NotFound => StatusCode::NOT_FOUND,
                ResolveError::Conflict(_) => StatusCode::CONFLICT,
                ResolveError::LockTimeout { .. } | ResolveError::UpstreamUnavailable(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ResolveError::KeywordCollision(_) | ResolveError::InvalidInput(_) => {
                    StatusCode::BAD_REQUEST
                }
                ResolveError::QueryBuild(_) | ResolveError::Internal(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                MetadataError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        }
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_failures_are_unavailable_not_not_found() {
        let err: ResolveError = CacheError::Backend("connection reset".to_string()).into();
        assert!(matches!(err, ResolveError::UpstreamUnavailable(_)));
        assert!(err.is_retryable());

        let err: ResolveError =
            MetadataError::Database(sqlx::Error::PoolTimedOut).into();
        assert!(matches!(err, ResolveError::UpstreamUnavailable(_)));
    }

    #[test]
    fn test_query_errors_keep_their_class() {
        let err: ResolveError = MetadataError::Query(QueryError::KeywordCollision {
            token: "select".to_string(),
            context: "field",
        })
        .into();
        assert!(matches!(err, ResolveError::KeywordCollision(_)));
        assert!(!err.is_retryable());

        let err: ResolveError = QueryError::Build("missing target".to_string()).into();
        assert_eq!(err, ResolveError::QueryBuild("missing target".to_string()));
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let err: ResolveError = MetadataError::AlreadyExists("s.ly/abc123".to_string()).into();
        assert_eq!(err, ResolveError::Conflict("s.ly/abc123".to_string()));
    }

    #[test]
    fn test_status_codes() {
        let status = |e: ResolveError| ApiError::from(e).status_code();
        assert_eq!(status(ResolveError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status(ResolveError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(
            status(ResolveError::LockTimeout {
                key: "k".into(),
                waited: Duration::from_secs(1)
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ResolveError::UpstreamUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(ResolveError::QueryBuild("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
