//! Link store trait and the SQLite implementation.
//!
//! A store owns one connection pool per shard. It never builds SQL itself:
//! callers hand it a [`RenderedQuery`] and the store runs it against the
//! shard bound by [`crate::shard::ShardRouter`], falling back to its default
//! shard when the call is unrouted.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{LinkRouteRow, LinkRow};
use crate::query::{ClauseKind, Dialect, RenderedQuery};
use crate::shard::{ShardId, current_shard};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Bind every [`crate::query::SqlValue`] of a rendered query, in order.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                $crate::query::SqlValue::Int(value) => query.bind(*value),
                $crate::query::SqlValue::Text(value) => query.bind(value.clone()),
                $crate::query::SqlValue::Timestamp(value) => query.bind(*value),
                $crate::query::SqlValue::Null($crate::query::SqlType::Int) => {
                    query.bind(None::<i64>)
                }
                $crate::query::SqlValue::Null($crate::query::SqlType::Text) => {
                    query.bind(None::<String>)
                }
                $crate::query::SqlValue::Null($crate::query::SqlType::Timestamp) => {
                    query.bind(None::<time::OffsetDateTime>)
                }
            };
        }
        query
    }};
}

pub(crate) use bind_params;

/// Sharded persistence for links and routes.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Placeholder syntax this store expects.
    fn dialect(&self) -> Dialect;

    /// Number of physical partitions.
    fn shard_count(&self) -> u32;

    /// Run a select that projects [`LinkRow`] columns.
    async fn fetch_links(&self, query: &RenderedQuery) -> MetadataResult<Vec<LinkRow>>;

    /// Run a select that projects [`LinkRouteRow`] columns.
    async fn fetch_routes(&self, query: &RenderedQuery) -> MetadataResult<Vec<LinkRouteRow>>;

    /// Run a single-value aggregate.
    async fn fetch_count(&self, query: &RenderedQuery) -> MetadataResult<i64>;

    /// Run an insert, update or delete. Returns rows affected; a unique
    /// violation surfaces as [`MetadataError::AlreadyExists`].
    async fn execute(&self, query: &RenderedQuery) -> MetadataResult<u64>;

    /// Create the schema on every shard.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check connectivity of every shard.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// Reject a rendered query handed to the wrong store method.
pub(crate) fn expect_kind(query: &RenderedQuery, allowed: &[ClauseKind]) -> MetadataResult<()> {
    if allowed.contains(&query.kind) {
        Ok(())
    } else {
        Err(MetadataError::Internal(format!(
            "{} query passed where {allowed:?} was expected",
            query.kind
        )))
    }
}

/// Resolve the shard for the current call.
pub(crate) fn active_shard(default_shard: ShardId, shard_count: usize) -> MetadataResult<ShardId> {
    let shard = current_shard().unwrap_or(default_shard);
    if shard.index() >= shard_count {
        return Err(MetadataError::Config(format!(
            "{shard} is not configured ({shard_count} shards available)"
        )));
    }
    Ok(shard)
}

/// SQLite-based link store, one database per shard.
pub struct SqliteStore {
    pools: Vec<Pool<Sqlite>>,
    default_shard: ShardId,
}

impl SqliteStore {
    /// Open (creating if needed) one database per path. `:memory:` gives a
    /// private in-memory database that lives as long as the store.
    pub async fn new(paths: &[PathBuf], default_shard: u32) -> MetadataResult<Self> {
        if paths.is_empty() {
            return Err(MetadataError::Config(
                "at least one sqlite shard is required".to_string(),
            ));
        }
        if default_shard as usize >= paths.len() {
            return Err(MetadataError::Config(format!(
                "default shard {default_shard} is out of range for {} shards",
                paths.len()
            )));
        }

        let mut pools = Vec::with_capacity(paths.len());
        for path in paths {
            pools.push(Self::open_shard(path).await?);
        }

        let store = Self {
            pools,
            default_shard: ShardId::new(default_shard),
        };
        store.migrate().await?;

        tracing::info!(
            shards = store.pools.len(),
            default_shard = %store.default_shard,
            "SQLite link store ready"
        );
        Ok(store)
    }

    /// A store of `shard_count` in-memory shards, for tests and demos.
    pub async fn in_memory(shard_count: u32) -> MetadataResult<Self> {
        let paths = vec![PathBuf::from(":memory:"); shard_count as usize];
        Self::new(&paths, 0).await
    }

    async fn open_shard(path: &Path) -> MetadataResult<Pool<Sqlite>> {
        let in_memory = path.as_os_str() == ":memory:";

        let opts = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        }
        .busy_timeout(Duration::from_secs(5));

        // A single connection per shard: SQLite serializes writers anyway,
        // and an in-memory database exists only inside its one connection.
        let mut pool = SqlitePoolOptions::new().max_connections(1);
        if in_memory {
            pool = pool
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        Ok(pool.connect_with(opts).await?)
    }

    fn pool(&self) -> MetadataResult<(ShardId, &Pool<Sqlite>)> {
        let shard = active_shard(self.default_shard, self.pools.len())?;
        Ok((shard, &self.pools[shard.index()]))
    }
}

#[async_trait]
impl LinkStore for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn shard_count(&self) -> u32 {
        self.pools.len() as u32
    }

    async fn fetch_links(&self, query: &RenderedQuery) -> MetadataResult<Vec<LinkRow>> {
        expect_kind(query, &[ClauseKind::Select])?;
        let (shard, pool) = self.pool()?;
        tracing::trace!(shard = %shard, sql = %query.sql, "Fetching links");
        let rows = bind_params!(sqlx::query_as::<_, LinkRow>(&query.sql), &query.params)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_routes(&self, query: &RenderedQuery) -> MetadataResult<Vec<LinkRouteRow>> {
        expect_kind(query, &[ClauseKind::Select])?;
        let (shard, pool) = self.pool()?;
        tracing::trace!(shard = %shard, sql = %query.sql, "Fetching routes");
        let rows = bind_params!(sqlx::query_as::<_, LinkRouteRow>(&query.sql), &query.params)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    async fn fetch_count(&self, query: &RenderedQuery) -> MetadataResult<i64> {
        expect_kind(query, &[ClauseKind::Aggregate])?;
        let (shard, pool) = self.pool()?;
        tracing::trace!(shard = %shard, sql = %query.sql, "Fetching aggregate");
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
        for pool in &self.pools {
            sqlx::query(SCHEMA_SQL).execute(pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        for (index, pool) in self.pools.iter().enumerate() {
            sqlx::query("SELECT 1").execute(pool).await.map_err(|e| {
                tracing::warn!(shard = index, error = %e, "Shard health check failed");
                MetadataError::Database(e)
            })?;
        }
        Ok(())
    }
}

/// SQLite schema, applied to every shard. Both tables live on every shard;
/// links are placed by gid and routes by full short URL.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS links (
    gid TEXT NOT NULL,
    domain TEXT NOT NULL,
    short_uri TEXT NOT NULL,
    full_short_url TEXT NOT NULL,
    origin_url TEXT NOT NULL,
    valid_date_type INTEGER NOT NULL DEFAULT 0,
    valid_date TEXT,
    enable_status INTEGER NOT NULL DEFAULT 0,
    del_flag INTEGER NOT NULL DEFAULT 0,
    create_time TEXT NOT NULL,
    update_time TEXT NOT NULL,
    PRIMARY KEY (gid, full_short_url)
);

CREATE INDEX IF NOT EXISTS idx_links_gid_live ON links (gid, del_flag, enable_status);

CREATE TABLE IF NOT EXISTS link_routes (
    full_short_url TEXT NOT NULL PRIMARY KEY,
    gid TEXT NOT NULL
);
"#;
