//! Sharded link store for the shortlink resolver.
//!
//! This crate provides the persistence side of resolution:
//! - A declarative query builder with per-dialect rendering
//! - Task-scoped shard routing
//! - SQLite and PostgreSQL stores holding one pool per shard
//! - The link repository tying the three together

pub mod error;
pub mod models;
pub mod postgres;
pub mod query;
pub mod repos;
pub mod shard;
pub mod store;

pub use error::{MetadataError, MetadataResult, QueryError, QueryResult};
pub use postgres::{PgPoolSettings, PostgresStore};
pub use repos::LinkRepository;
pub use shard::{HashModStrategy, ShardId, ShardRouter, ShardStrategy, current_shard};
pub use store::{LinkStore, SqliteStore};

use shortlink_core::config::MetadataConfig;
use std::sync::Arc;

/// Create a link store from configuration.
pub async fn from_config(config: &MetadataConfig) -> MetadataResult<Arc<dyn LinkStore>> {
    match config {
        MetadataConfig::Sqlite {
            shards,
            default_shard,
        } => {
            let store = SqliteStore::new(shards, *default_shard).await?;
            Ok(Arc::new(store) as Arc<dyn LinkStore>)
        }
        MetadataConfig::Postgres {
            shards,
            default_shard,
            ssl_mode,
            max_connections,
            statement_timeout_ms,
        } => {
            let settings = PgPoolSettings {
                ssl_mode: *ssl_mode,
                max_connections: *max_connections,
                statement_timeout_ms: *statement_timeout_ms,
            };
            let store = PostgresStore::connect(shards, *default_shard, settings).await?;
            Ok(Arc::new(store) as Arc<dyn LinkStore>)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let temp_dir = tempfile::tempdir().unwrap();
        let shards = vec![
            temp_dir.path().join("shard-0.db"),
            temp_dir.path().join("shard-1.db"),
        ];
        let config = MetadataConfig::Sqlite {
            shards: shards.clone(),
            default_shard: 1,
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
        assert_eq!(store.shard_count(), 2);
        assert!(shards.iter().all(|p| p.exists()));
    }
}
