//! Link store and query construction error types.

use thiserror::Error;

/// Query graph validation and rendering errors. Never retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// A field, alias, table or label collides with a reserved keyword.
    #[error("reserved keyword used as {context}: {token}")]
    KeywordCollision { token: String, context: &'static str },

    /// A field, alias, table or label is not a plain identifier.
    #[error("invalid identifier used as {context}: {token:?}")]
    InvalidIdentifier { token: String, context: &'static str },

    /// The graph is incomplete or inconsistent.
    #[error("query build error: {0}")]
    Build(String),
}

/// Link store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("corrupt record: {0}")]
    Core(#[from] shortlink_core::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    /// Map a unique-constraint violation to `AlreadyExists`, keep everything else.
    pub(crate) fn from_write(err: sqlx::Error, what: impl FnOnce() -> String) -> Self {
        match err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::AlreadyExists(what())
            }
            other => Self::Database(other),
        }
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("I/O error: {err}"))
    }
}

/// Result type for link store operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// Result type for query construction.
pub type QueryResult<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display() {
        let err = QueryError::KeywordCollision {
            token: "select".to_string(),
            context: "field",
        };
        assert_eq!(err.to_string(), "reserved keyword used as field: select");

        let err: MetadataError = QueryError::Build("missing target".to_string()).into();
        assert_eq!(err.to_string(), "query build error: missing target");
    }
}
