//! Bound parameter values.

use time::OffsetDateTime;

/// Column type of a typed NULL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SqlType {
    Int,
    Text,
    Timestamp,
}

/// A value that always travels as a bound parameter, never as SQL text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SqlValue {
    Int(i64),
    Text(String),
    Timestamp(OffsetDateTime),
    /// NULL carrying its column type so engines with strict parameter
    /// typing accept it.
    Null(SqlType),
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<OffsetDateTime> for SqlValue {
    fn from(value: OffsetDateTime) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Option<OffsetDateTime>> for SqlValue {
    fn from(value: Option<OffsetDateTime>) -> Self {
        value.map_or(Self::Null(SqlType::Timestamp), Self::Timestamp)
    }
}

impl From<Option<String>> for SqlValue {
    fn from(value: Option<String>) -> Self {
        value.map_or(Self::Null(SqlType::Text), Self::Text)
    }
}
