//! Startup wiring: store, backends, filter seeding and background tasks.

use crate::links::{LinkService, LinkServiceSettings};
use crate::resolver::{Resolver, ResolverSettings};
use crate::state::AppState;
use crate::stats::{ChannelStatsPublisher, LoggingStatsSink, NoopStatsPublisher, StatsPublisher};
use anyhow::{Context, Result};
use shortlink_cache::{CacheBackends, ExistenceFilter};
use shortlink_core::FullShortUrl;
use shortlink_core::config::{AppConfig, FilterConfig};
use shortlink_core::keys;
use shortlink_metadata::{LinkRepository, LinkStore, ShardRouter};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// How often the in-process cache drops expired entries.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Assemble application state over an existing store and backends.
pub fn build_state(
    config: AppConfig,
    store: Arc<dyn LinkStore>,
    backends: CacheBackends,
    stats: Arc<dyn StatsPublisher>,
) -> Result<AppState> {
    let router = ShardRouter::hash_mod(config.sharding.shard_count)
        .context("failed to build shard router")?;
    let repository =
        LinkRepository::new(store, router).context("link store does not match sharding config")?;

    let resolver = Resolver::new(
        backends.clone(),
        repository.clone(),
        stats,
        ResolverSettings::from_config(&config),
    );
    let links = LinkService::new(
        backends.clone(),
        repository.clone(),
        LinkServiceSettings::from_config(&config),
    );

    Ok(AppState {
        config: Arc::new(config),
        backends,
        repository,
        resolver: Arc::new(resolver),
        links: Arc::new(links),
    })
}

/// Rebuild every domain filter from the route tables on all shards.
///
/// The default domain always gets a filter, even with no links yet.
/// Returns the number of routes added.
pub async fn seed_filters(
    filter: &dyn ExistenceFilter,
    repository: &LinkRepository,
    sizing: &FilterConfig,
    default_domain: &str,
) -> Result<usize> {
    let routes = repository
        .all_routes()
        .await
        .context("failed to load routes for filter seeding")?;

    let mut by_domain: BTreeMap<String, Vec<String>> = BTreeMap::new();
    by_domain.entry(default_domain.to_ascii_lowercase()).or_default();
    for route in routes {
        match FullShortUrl::parse(&route.full_short_url) {
            Ok(url) => by_domain
                .entry(url.domain().to_string())
                .or_default()
                .push(route.full_short_url),
            Err(e) => {
                tracing::warn!(
                    full_short_url = %route.full_short_url,
                    gid = %route.gid,
                    error = %e,
                    "Skipping malformed route while seeding filters"
                );
            }
        }
    }

    let mut seeded = 0;
    for (domain, urls) in &by_domain {
        let name = keys::filter_name(domain);
        filter
            .init_filter(&name, sizing.expected_insertions, sizing.false_positive_rate)
            .await
            .with_context(|| format!("failed to create filter for {domain}"))?;
        filter
            .add_all(&name, urls)
            .await
            .with_context(|| format!("failed to seed filter for {domain}"))?;
        if urls.len() > sizing.expected_insertions {
            tracing::warn!(
                domain = %domain,
                links = urls.len(),
                expected_insertions = sizing.expected_insertions,
                "Domain holds more links than its filter is sized for"
            );
        }
        tracing::info!(domain = %domain, links = urls.len(), "Existence filter seeded");
        seeded += urls.len();
    }
    Ok(seeded)
}

/// A running application: state plus the background tasks it owns.
pub struct Application {
    pub state: AppState,
    pub tasks: Vec<JoinHandle<()>>,
}

/// Connect the configured store, create in-process backends, seed filters
/// and spawn background tasks.
pub async fn start(config: AppConfig) -> Result<Application> {
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    let store = shortlink_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize link store")?;
    store
        .health_check()
        .await
        .context("link store health check failed")?;
    tracing::info!(shards = store.shard_count(), "Link store initialized");

    let (backends, memory_cache) = CacheBackends::in_memory();
    let mut tasks = vec![memory_cache.spawn_sweeper(CACHE_SWEEP_INTERVAL)];

    let stats: Arc<dyn StatsPublisher> = if config.stats.enabled {
        let (publisher, handle) =
            ChannelStatsPublisher::spawn(Arc::new(LoggingStatsSink), config.stats.queue_capacity);
        tasks.push(handle);
        Arc::new(publisher)
    } else {
        tracing::info!("Access statistics disabled");
        Arc::new(NoopStatsPublisher)
    };

    let state = build_state(config, store, backends, stats)?;
    let seeded = seed_filters(
        state.backends.filter.as_ref(),
        &state.repository,
        &state.config.filter,
        &state.config.server.default_domain,
    )
    .await?;
    tracing::info!(routes = seeded, "Existence filters ready");

    Ok(Application { state, tasks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use shortlink_cache::BloomFilters;
    use shortlink_core::{EnableStatus, ShortLink, ValidityMode};
    use shortlink_metadata::SqliteStore;
    use time::OffsetDateTime;

    fn link(domain: &str, short_uri: &str) -> ShortLink {
        let now = OffsetDateTime::now_utc();
        ShortLink {
            gid: "g1".to_string(),
            full_short_url: FullShortUrl::new(domain, short_uri).unwrap(),
            origin_url: "https://example.com".to_string(),
            validity: ValidityMode::Permanent,
            status: EnableStatus::Enabled,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_seed_filters_groups_by_domain() {
        let store = Arc::new(SqliteStore::in_memory(3).await.unwrap());
        let repository = LinkRepository::new(store, ShardRouter::hash_mod(3).unwrap()).unwrap();
        repository.create(&link("s.ly", "abc123")).await.unwrap();
        repository.create(&link("s.ly", "def456")).await.unwrap();
        repository.create(&link("go.to", "xyz789")).await.unwrap();

        let filters = BloomFilters::new();
        let sizing = FilterConfig {
            expected_insertions: 100,
            false_positive_rate: 0.001,
        };
        let seeded = seed_filters(&filters, &repository, &sizing, "home.ly")
            .await
            .unwrap();
        assert_eq!(seeded, 3);

        assert!(filters.contains(&keys::filter_name("s.ly"), "s.ly/abc123").await.unwrap());
        assert!(filters.contains(&keys::filter_name("go.to"), "go.to/xyz789").await.unwrap());
        assert!(!filters.contains(&keys::filter_name("go.to"), "s.ly/abc123").await.unwrap());
        assert_eq!(filters.inserted(&keys::filter_name("home.ly")), Some(0));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let mut config = AppConfig::for_testing(2);
        config.sharding.shard_count = 5;
        assert!(start(config).await.is_err());
    }

    #[tokio::test]
    async fn test_start_in_memory() {
        let app = start(AppConfig::for_testing(2)).await.unwrap();
        assert_eq!(app.tasks.len(), 2);
        app.state.repository.store().health_check().await.unwrap();
        for task in app.tasks {
            task.abort();
        }
    }
}
