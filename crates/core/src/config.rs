//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Domain used when a request carries no usable Host header.
    #[serde(default = "default_domain")]
    pub default_domain: String,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    /// SECURITY: When enabled, ensure this endpoint is network-restricted
    /// to authorized Prometheus scraper IPs only at the infrastructure level.
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_domain() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            default_domain: default_domain(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Sharded link store configuration.
///
/// Every entry in `shards` is one physical partition; its index is the shard id.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// One SQLite database file per shard (testing and small deployments).
    Sqlite {
        /// Database file paths, indexed by shard id. `:memory:` is accepted.
        shards: Vec<PathBuf>,
        /// Partition used when no shard is routed for a call.
        #[serde(default)]
        default_shard: u32,
    },
    /// One PostgreSQL database per shard.
    Postgres {
        /// Connection URLs, indexed by shard id.
        /// WARNING: Prefer SHORTLINK_METADATA__SHARDS env var over storing passwords in config.
        shards: Vec<String>,
        /// Partition used when no shard is routed for a call.
        #[serde(default)]
        default_shard: u32,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections per shard pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds (prevents hung queries).
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(5_000)
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            shards: vec![
                PathBuf::from("./data/shard_0.db"),
                PathBuf::from("./data/shard_1.db"),
            ],
            default_shard: 0,
        }
    }
}

impl MetadataConfig {
    /// Number of physical partitions configured.
    pub fn shard_count(&self) -> usize {
        match self {
            Self::Sqlite { shards, .. } => shards.len(),
            Self::Postgres { shards, .. } => shards.len(),
        }
    }

    pub fn default_shard(&self) -> u32 {
        match self {
            Self::Sqlite { default_shard, .. } | Self::Postgres { default_shard, .. } => {
                *default_shard
            }
        }
    }

    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        let count = self.shard_count();
        if count == 0 {
            return Err("metadata.shards must list at least one partition".to_string());
        }
        if self.default_shard() as usize >= count {
            return Err(format!(
                "metadata.default_shard {} is out of range for {} shards",
                self.default_shard(),
                count
            ));
        }
        if let Self::Postgres {
            max_connections, ..
        } = self
            && *max_connections == 0
        {
            return Err("metadata.max_connections cannot be 0".to_string());
        }
        Ok(())
    }
}

/// Shard routing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShardingConfig {
    /// Number of shards keys are hashed onto. Must equal the number of
    /// configured partitions; changing it requires redistributing data.
    #[serde(default = "default_shard_count")]
    pub shard_count: u32,
}

fn default_shard_count() -> u32 {
    2
}

impl Default for ShardingConfig {
    fn default() -> Self {
        Self {
            shard_count: default_shard_count(),
        }
    }
}

/// Cache TTL configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Upper bound for positive entries (default: 30 days). A link with a
    /// custom validity window gets the smaller of this and its remaining time.
    #[serde(default = "default_positive_ttl_secs")]
    pub positive_ttl_secs: u64,
    /// TTL of negative (absence) entries (default: 30 minutes).
    #[serde(default = "default_negative_ttl_secs")]
    pub negative_ttl_secs: u64,
}

/// Longest accepted positive entry TTL (10 years).
pub const MAX_CACHE_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

fn default_positive_ttl_secs() -> u64 {
    30 * 24 * 3600
}

fn default_negative_ttl_secs() -> u64 {
    30 * 60
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            positive_ttl_secs: default_positive_ttl_secs(),
            negative_ttl_secs: default_negative_ttl_secs(),
        }
    }
}

impl CacheConfig {
    pub fn positive_ttl(&self) -> Duration {
        Duration::from_secs(self.positive_ttl_secs)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.negative_ttl_secs == 0 {
            return Err("cache.negative_ttl_secs cannot be 0".to_string());
        }
        if self.positive_ttl_secs > MAX_CACHE_TTL_SECS {
            return Err(format!(
                "cache.positive_ttl_secs ({}) exceeds the maximum of {MAX_CACHE_TTL_SECS}",
                self.positive_ttl_secs
            ));
        }
        if self.negative_ttl_secs >= self.positive_ttl_secs {
            return Err(format!(
                "cache.negative_ttl_secs ({}) must be shorter than cache.positive_ttl_secs ({})",
                self.negative_ttl_secs, self.positive_ttl_secs
            ));
        }
        Ok(())
    }
}

/// Existence filter sizing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Expected number of links per domain filter.
    #[serde(default = "default_expected_insertions")]
    pub expected_insertions: usize,
    /// Target false-positive rate, in (0, 1).
    #[serde(default = "default_false_positive_rate")]
    pub false_positive_rate: f64,
}

fn default_expected_insertions() -> usize {
    1_000_000
}

fn default_false_positive_rate() -> f64 {
    0.001
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            expected_insertions: default_expected_insertions(),
            false_positive_rate: default_false_positive_rate(),
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.expected_insertions == 0 {
            return Err("filter.expected_insertions cannot be 0".to_string());
        }
        if !(self.false_positive_rate > 0.0 && self.false_positive_rate < 1.0) {
            return Err(format!(
                "filter.false_positive_rate must be in (0, 1), got {}",
                self.false_positive_rate
            ));
        }
        Ok(())
    }
}

/// What a resolution does once its lock wait budget is exhausted.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LockTimeoutFallback {
    /// Read the store without the lock (accepts an extra store hit).
    #[default]
    DirectRead,
    /// Answer NotFound.
    NotFound,
    /// Surface a retryable LockTimeout error.
    Error,
}

/// Load-through lock configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LockConfig {
    /// Maximum time to wait for the per-key lock.
    #[serde(default = "default_lock_wait_ms")]
    pub wait_ms: u64,
    /// Lease after which a held lock expires even if never released.
    #[serde(default = "default_lock_lease_ms")]
    pub lease_ms: u64,
    /// Extra acquisition rounds after the first wait budget is exhausted.
    #[serde(default = "default_lock_retry_attempts")]
    pub retry_attempts: u32,
    /// Behaviour once all rounds time out.
    #[serde(default)]
    pub timeout_fallback: LockTimeoutFallback,
}

/// Longest accepted lock wait or lease (1 hour).
pub const MAX_LOCK_MS: u64 = 3_600_000;

fn default_lock_wait_ms() -> u64 {
    3_000
}

fn default_lock_lease_ms() -> u64 {
    10_000
}

fn default_lock_retry_attempts() -> u32 {
    1
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            wait_ms: default_lock_wait_ms(),
            lease_ms: default_lock_lease_ms(),
            retry_attempts: default_lock_retry_attempts(),
            timeout_fallback: LockTimeoutFallback::default(),
        }
    }
}

impl LockConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.wait_ms == 0 || self.lease_ms == 0 {
            return Err("lock.wait_ms and lock.lease_ms must be non-zero".to_string());
        }
        if self.wait_ms > MAX_LOCK_MS || self.lease_ms > MAX_LOCK_MS {
            return Err(format!(
                "lock.wait_ms and lock.lease_ms cannot exceed {MAX_LOCK_MS}"
            ));
        }
        Ok(())
    }
}

/// Backend retry policy for the resolution boundary.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolveConfig {
    /// Retries after a cache/store/lock backend failure (0 = fail fast).
    #[serde(default = "default_backend_retry_attempts")]
    pub backend_retry_attempts: u32,
    /// Initial backoff, doubled per retry.
    #[serde(default = "default_backend_retry_backoff_ms")]
    pub backend_retry_backoff_ms: u64,
}

fn default_backend_retry_attempts() -> u32 {
    2
}

fn default_backend_retry_backoff_ms() -> u64 {
    50
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            backend_retry_attempts: default_backend_retry_attempts(),
            backend_retry_backoff_ms: default_backend_retry_backoff_ms(),
        }
    }
}

impl ResolveConfig {
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.backend_retry_backoff_ms.saturating_mul(factor))
    }
}

/// Access statistics publication.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_enabled")]
    pub enabled: bool,
    /// Bounded queue between the resolver and the sink; overflow drops events.
    #[serde(default = "default_stats_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_stats_enabled() -> bool {
    true
}

fn default_stats_queue_capacity() -> usize {
    10_000
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: default_stats_enabled(),
            queue_capacity: default_stats_queue_capacity(),
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub sharding: ShardingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub lock: LockConfig,
    #[serde(default)]
    pub resolve: ResolveConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

impl AppConfig {
    /// Create a test configuration.
    ///
    /// **For testing only.** Uses in-memory SQLite shards and short lock budgets.
    pub fn for_testing(shard_count: u32) -> Self {
        Self {
            metadata: MetadataConfig::Sqlite {
                shards: (0..shard_count).map(|_| PathBuf::from(":memory:")).collect(),
                default_shard: 0,
            },
            sharding: ShardingConfig { shard_count },
            filter: FilterConfig {
                expected_insertions: 10_000,
                false_positive_rate: 0.001,
            },
            lock: LockConfig {
                wait_ms: 2_000,
                lease_ms: 5_000,
                retry_attempts: 0,
                timeout_fallback: LockTimeoutFallback::DirectRead,
            },
            resolve: ResolveConfig {
                backend_retry_attempts: 0,
                backend_retry_backoff_ms: 1,
            },
            ..Self::default()
        }
    }

    /// Validate cross-section invariants.
    pub fn validate(&self) -> Result<(), String> {
        self.metadata.validate()?;
        self.cache.validate()?;
        self.filter.validate()?;
        self.lock.validate()?;
        if self.sharding.shard_count == 0 {
            return Err("sharding.shard_count cannot be 0".to_string());
        }
        if self.sharding.shard_count as usize != self.metadata.shard_count() {
            return Err(format!(
                "sharding.shard_count ({}) must equal the number of metadata shards ({})",
                self.sharding.shard_count,
                self.metadata.shard_count()
            ));
        }
        if self.stats.queue_capacity == 0 {
            return Err("stats.queue_capacity cannot be 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        AppConfig::default().validate().unwrap();
        AppConfig::for_testing(4).validate().unwrap();
    }

    #[test]
    fn test_negative_ttl_must_be_shorter() {
        let cache = CacheConfig {
            positive_ttl_secs: 60,
            negative_ttl_secs: 60,
        };
        assert!(cache.validate().is_err());
    }

    #[test]
    fn test_cache_and_lock_budgets_are_bounded() {
        let cache = CacheConfig {
            positive_ttl_secs: u64::MAX,
            negative_ttl_secs: 60,
        };
        let err = cache.validate().unwrap_err();
        assert!(err.contains("cache.positive_ttl_secs"), "{err}");

        let cache = CacheConfig {
            positive_ttl_secs: MAX_CACHE_TTL_SECS,
            negative_ttl_secs: 60,
        };
        cache.validate().unwrap();

        let lock = LockConfig {
            wait_ms: u64::MAX,
            ..LockConfig::default()
        };
        assert!(lock.validate().is_err());
        let lock = LockConfig {
            lease_ms: MAX_LOCK_MS + 1,
            ..LockConfig::default()
        };
        assert!(lock.validate().is_err());
    }

    #[test]
    fn test_shard_count_must_match_partitions() {
        let mut config = AppConfig::for_testing(2);
        config.sharding.shard_count = 3;
        let err = config.validate().unwrap_err();
        assert!(err.contains("sharding.shard_count"), "{err}");
    }

    #[test]
    fn test_default_shard_out_of_range() {
        let config = MetadataConfig::Sqlite {
            shards: vec![PathBuf::from(":memory:")],
            default_shard: 1,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_filter_rate_bounds() {
        for rate in [0.0, 1.0, -0.5, f64::NAN] {
            let filter = FilterConfig {
                expected_insertions: 10,
                false_positive_rate: rate,
            };
            assert!(filter.validate().is_err(), "rate {rate} accepted");
        }
    }

    #[test]
    fn test_metadata_config_deserialize_postgres() {
        let json = r#"{"type":"postgres","shards":["postgres://a/db0","postgres://a/db1"]}"#;
        let config: MetadataConfig = serde_json::from_str(json).unwrap();
        match config {
            MetadataConfig::Postgres {
                shards,
                default_shard,
                max_connections,
                ..
            } => {
                assert_eq!(shards.len(), 2);
                assert_eq!(default_shard, 0);
                assert_eq!(max_connections, 10);
            }
            _ => panic!("expected postgres config"),
        }
    }

    #[test]
    fn test_lock_fallback_deserialize() {
        let json = r#"{"wait_ms": 10, "timeout_fallback": "not_found"}"#;
        let lock: LockConfig = serde_json::from_str(json).unwrap();
        assert_eq!(lock.timeout_fallback, LockTimeoutFallback::NotFound);
        assert_eq!(lock.lease_ms, 10_000);
    }

    #[test]
    fn test_backoff_doubles() {
        let resolve = ResolveConfig {
            backend_retry_attempts: 3,
            backend_retry_backoff_ms: 10,
        };
        assert_eq!(resolve.backoff(0), Duration::from_millis(10));
        assert_eq!(resolve.backoff(2), Duration::from_millis(40));
        assert_eq!(resolve.backoff(200), Duration::from_millis(u64::MAX));
    }
}
