//! PostgreSQL-based link store, one database per shard.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{LinkRouteRow, LinkRow};
use crate::query::{ClauseKind, Dialect, RenderedQuery};
use crate::shard::ShardId;
use crate::store::{LinkStore, active_shard, bind_params, expect_kind};
use async_trait::async_trait;
use shortlink_core::config::PgSslMode;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode as SqlxPgSslMode};
use sqlx::{Pool, Postgres};
use std::str::FromStr;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Split the schema into single statements, dropping comment-only chunks.
fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

/// Connection settings shared by every shard pool.
#[derive(Clone, Copy, Debug)]
pub struct PgPoolSettings {
    pub ssl_mode: Option<PgSslMode>,
    pub max_connections: u32,
    pub statement_timeout_ms: Option<u64>,
}

pub struct PostgresStore {
    pools: Vec<Pool<Postgres>>,
    default_shard: ShardId,
}

impl PostgresStore {
    /// Connect to every shard URL and apply the schema.
    pub async fn connect(
        urls: &[String],
        default_shard: u32,
        settings: PgPoolSettings,
    ) -> MetadataResult<Self> {
        if urls.is_empty() {
            return Err(MetadataError::Config(
                "at least one postgres shard is required".to_string(),
            ));
        }
        if default_shard as usize >= urls.len() {
            return Err(MetadataError::Config(format!(
                "default shard {default_shard} is out of range for {} shards",
                urls.len()
            )));
        }

        let mut pools = Vec::with_capacity(urls.len());
        for (index, url) in urls.iter().enumerate() {
            let mut opts = PgConnectOptions::from_str(url)?;
            if let Some(mode) = settings.ssl_mode {
                opts = opts.ssl_mode(match mode {
                    PgSslMode::Disable => SqlxPgSslMode::Disable,
                    PgSslMode::Prefer => SqlxPgSslMode::Prefer,
                    PgSslMode::Require => SqlxPgSslMode::Require,
                });
            }
            if let Some(timeout_ms) = settings.statement_timeout_ms {
                opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            }

            // Log target without credentials.
            tracing::info!(
                shard = index,
                host = opts.get_host(),
                database = opts.get_database().unwrap_or("<default>"),
                ssl_mode = ?settings.ssl_mode,
                "Connecting PostgreSQL shard"
            );

            let pool = PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .connect_with(opts)
                .await?;
            pools.push(pool);
        }

        let store = Self {
            pools,
            default_shard: ShardId::new(default_shard),
        };
        store.migrate().await?;
        Ok(store)
    }

    fn pool(&self) -> MetadataResult<(ShardId, &Pool<Postgres>)> {
        let shard = active_shard(self.default_shard, self.pools.len())?;
        Ok((shard, &self.pools[shard.index()]))
    }
}

#[async_trait]
impl LinkStore for PostgresStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn shard_count(&self) -> u32 {
        self.pools.len() as u32
    }

    async fn fetch_links(&self, query: &RenderedQuery) -> MetadataResult<Vec<LinkRow>> {
        expect_kind(query, &[ClauseKind::Select])?;
        let (shard, pool) = self.pool()?;
        tracing::trace!(shard = %shard, sql = %query.sql, "Fetching links");
        Ok(
            bind_params!(sqlx::query_as::<_, LinkRow>(&query.sql), &query.params)
                .fetch_all(pool)
                .await?,
        )
    }

    async fn fetch_routes(&self, query: &RenderedQuery) -> MetadataResult<Vec<LinkRouteRow>> {
        expect_kind(query, &[ClauseKind::Select])?;
        let (shard, pool) = self.pool()?;
        tracing::trace!(shard = %shard, sql = %query.sql, "Fetching routes");
        Ok(
            bind_params!(sqlx::query_as::<_, LinkRouteRow>(&query.sql), &query.params)
                .fetch_all(pool)
                .await?,
        )
    }

    async fn fetch_count(&self, query: &RenderedQuery) -> MetadataResult<i64> {
        expect_kind(query, &[ClauseKind::Aggregate])?;
        let (_, pool) = self.pool()?;
        let value: Option<i64> =
            bind_params!(sqlx::query_scalar::<_, Option<i64>>(&query.sql), &query.params)
                .fetch_one(pool)
                .await?;
        Ok(value.unwrap_or(0))
    }

    async fn execute(&self, query: &RenderedQuery) -> MetadataResult<u64> {
        expect_kind(
            query,
            &[ClauseKind::Insert, ClauseKind::Update, ClauseKind::Delete],
        )?;
        let (shard, pool) = self.pool()?;
        tracing::trace!(shard = %shard, sql = %query.sql, "Executing statement");
        let result = bind_params!(sqlx::query(&query.sql), &query.params)
            .execute(pool)
            .await
            .map_err(|e| MetadataError::from_write(e, || format!("duplicate row on {shard}")))?;
        Ok(result.rows_affected())
    }

    async fn migrate(&self) -> MetadataResult<()> {
        // Prepared statements hold one statement each.
        for pool in &self.pools {
            for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
                sqlx::query(statement).execute(pool).await?;
            }
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        for pool in &self.pools {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_statements_split() {
        let statements = postgres_schema_statements(POSTGRES_SCHEMA);
        assert_eq!(statements.len(), 3);
        assert!(statements[0].contains("CREATE TABLE IF NOT EXISTS links"));
        assert!(statements[2].contains("link_routes"));
    }

    #[test]
    fn test_comment_only_chunks_dropped() {
        let statements = postgres_schema_statements("-- header\n;\nSELECT 1;\n-- trailing\n");
        assert_eq!(statements, vec!["SELECT 1"]);
    }
}
