//! Short link resolution.
//!
//! Each lookup walks a fixed sequence:
//!
//! 1. Cache lookup. A positive entry answers immediately; a negative entry
//!    answers NotFound.
//! 2. Existence filter. If the domain filter has never seen the full short
//!    URL the store cannot hold it, so the answer is NotFound.
//! 3. Locked load. Under the per-URL lock the cache is checked again, and
//!    only if it is still cold does the store get queried. The result is
//!    cached positively or negatively before the lock is released.
//!
//! Every NotFound looks the same to the caller, whichever step produced it.

use crate::error::{ResolveError, ResolveResult};
use crate::metrics;
use crate::stats::{AccessContext, AccessEvent, StatsPublisher};
use shortlink_cache::{
    CacheBackends, CacheStore, DistributedLock, ExistenceFilter, LockOptions, with_lock,
};
use shortlink_core::config::{AppConfig, LockTimeoutFallback, ResolveConfig};
use shortlink_core::{Eligibility, FullShortUrl, keys};
use shortlink_metadata::LinkRepository;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;

/// Tunables for one [`Resolver`].
#[derive(Clone, Debug)]
pub struct ResolverSettings {
    /// Domain used by [`Resolver::resolve`].
    pub default_domain: String,
    /// Ceiling for positive entries.
    pub positive_ttl: Duration,
    pub negative_ttl: Duration,
    pub lock: LockOptions,
    /// Extra lock rounds after the first wait budget runs out.
    pub lock_retry_attempts: u32,
    pub timeout_fallback: LockTimeoutFallback,
    pub retry: ResolveConfig,
}

impl ResolverSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_domain: config.server.default_domain.clone(),
            positive_ttl: config.cache.positive_ttl(),
            negative_ttl: config.cache.negative_ttl(),
            lock: LockOptions::new(config.lock.wait(), config.lock.lease()),
            lock_retry_attempts: config.lock.retry_attempts,
            timeout_fallback: config.lock.timeout_fallback,
            retry: config.resolve.clone(),
        }
    }
}

/// Where a successful answer came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    Store,
}

impl ResolutionSource {
    fn label(self) -> &'static str {
        match self {
            Self::Cache => "hit",
            Self::Store => "loaded",
        }
    }
}

/// A successful resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolution {
    pub full_short_url: FullShortUrl,
    pub origin_url: String,
    /// Owning group, known only when the store was read.
    pub gid: Option<String>,
    pub source: ResolutionSource,
}

impl Resolution {
    fn cached(url: &FullShortUrl, origin_url: String) -> Self {
        Self {
            full_short_url: url.clone(),
            origin_url,
            gid: None,
            source: ResolutionSource::Cache,
        }
    }
}

enum CacheState {
    Hit(String),
    Negative,
    Miss,
}

/// Resolves short identifiers to origin URLs.
pub struct Resolver {
    cache: Arc<dyn CacheStore>,
    filter: Arc<dyn ExistenceFilter>,
    lock: Arc<dyn DistributedLock>,
    links: LinkRepository,
    stats: Arc<dyn StatsPublisher>,
    settings: ResolverSettings,
}

impl Resolver {
    pub fn new(
        backends: CacheBackends,
        links: LinkRepository,
        stats: Arc<dyn StatsPublisher>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            cache: backends.cache,
            filter: backends.filter,
            lock: backends.lock,
            links,
            stats,
            settings,
        }
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Resolve `short_uri` under the default domain to its origin URL.
    pub async fn resolve(&self, short_uri: &str) -> ResolveResult<String> {
        let domain = self.settings.default_domain.clone();
        self.resolve_in(&domain, short_uri, AccessContext::default())
            .await
            .map(|r| r.origin_url)
    }

    /// Resolve `short_uri` under `domain`. Identifiers that could never have
    /// been issued are NotFound.
    pub async fn resolve_in(
        &self,
        domain: &str,
        short_uri: &str,
        access: AccessContext,
    ) -> ResolveResult<Resolution> {
        match FullShortUrl::new(domain, short_uri) {
            Ok(url) => self.resolve_url(&url, access).await,
            Err(e) => {
                tracing::debug!(domain = %domain, short_uri = %short_uri, error = %e, "Rejected malformed identifier");
                metrics::record_outcome("invalid");
                Err(ResolveError::NotFound)
            }
        }
    }

    /// Resolve a full short URL and publish an access event on success.
    pub async fn resolve_url(
        &self,
        url: &FullShortUrl,
        access: AccessContext,
    ) -> ResolveResult<Resolution> {
        let timer = metrics::RESOLVE_DURATION.start_timer();
        let result = self.retrying(url).await;
        timer.observe_duration();

        match &result {
            Ok(resolution) => {
                metrics::record_outcome(resolution.source.label());
                self.publish_access(resolution, access);
            }
            Err(ResolveError::NotFound) => metrics::record_outcome("not_found"),
            Err(e) => {
                metrics::record_outcome("error");
                tracing::error!(full_short_url = %url, error = %e, "Resolution failed");
            }
        }
        result
    }

    async fn retrying(&self, url: &FullShortUrl) -> ResolveResult<Resolution> {
        let mut attempt = 0;
        loop {
            match self.pipeline(url).await {
                Err(ResolveError::UpstreamUnavailable(reason))
                    if attempt < self.settings.retry.backend_retry_attempts =>
                {
                    let delay = self.settings.retry.backoff(attempt);
                    attempt += 1;
                    metrics::BACKEND_RETRIES.inc();
                    tracing::warn!(
                        full_short_url = %url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %reason,
                        "Backend unavailable, retrying resolution"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }

    async fn pipeline(&self, url: &FullShortUrl) -> ResolveResult<Resolution> {
        match self.lookup_cache(url).await? {
            CacheState::Hit(origin_url) => {
                metrics::CACHE_HITS.inc();
                tracing::debug!(full_short_url = %url, "Cache hit");
                return Ok(Resolution::cached(url, origin_url));
            }
            CacheState::Negative => {
                metrics::CACHE_NEGATIVE_HITS.inc();
                tracing::debug!(full_short_url = %url, "Negative cache hit");
                return Err(ResolveError::NotFound);
            }
            CacheState::Miss => {}
        }

        let filter = keys::filter_name(url.domain());
        if !self.filter.contains(&filter, url.as_str()).await? {
            metrics::FILTER_REJECTIONS.inc();
            tracing::debug!(full_short_url = %url, "Existence filter reports absent");
            return Err(ResolveError::NotFound);
        }

        self.locked_load(url).await
    }

    async fn lookup_cache(&self, url: &FullShortUrl) -> ResolveResult<CacheState> {
        if let Some(origin_url) = self.cache.get(&keys::goto_key(url)).await? {
            return Ok(CacheState::Hit(origin_url));
        }
        if self.cache.exists(&keys::goto_is_null_key(url)).await? {
            return Ok(CacheState::Negative);
        }
        Ok(CacheState::Miss)
    }

    async fn locked_load(&self, url: &FullShortUrl) -> ResolveResult<Resolution> {
        let key = keys::goto_lock_key(url);
        let rounds = self.settings.lock_retry_attempts.saturating_add(1);

        for round in 1..=rounds {
            let this = self;
            let result = with_lock(&self.lock, &key, self.settings.lock, move || async move {
                match this.lookup_cache(url).await? {
                    CacheState::Hit(origin_url) => {
                        tracing::debug!(full_short_url = %url, "Cache populated while waiting for lock");
                        metrics::CACHE_HITS.inc();
                        Ok(Resolution::cached(url, origin_url))
                    }
                    CacheState::Negative => {
                        metrics::CACHE_NEGATIVE_HITS.inc();
                        Err(ResolveError::NotFound)
                    }
                    CacheState::Miss => this.load_from_store(url).await,
                }
            })
            .await;

            match result {
                Err(ResolveError::LockTimeout { waited, .. }) => {
                    metrics::LOCK_TIMEOUTS.inc();
                    tracing::warn!(
                        full_short_url = %url,
                        round,
                        rounds,
                        waited_ms = waited.as_millis() as u64,
                        "Timed out waiting for load lock"
                    );
                    // The holder may have finished in the meantime.
                    match self.lookup_cache(url).await? {
                        CacheState::Hit(origin_url) => {
                            metrics::CACHE_HITS.inc();
                            return Ok(Resolution::cached(url, origin_url));
                        }
                        CacheState::Negative => {
                            metrics::CACHE_NEGATIVE_HITS.inc();
                            return Err(ResolveError::NotFound);
                        }
                        CacheState::Miss => {}
                    }
                }
                other => return other,
            }
        }

        match self.settings.timeout_fallback {
            LockTimeoutFallback::DirectRead => {
                tracing::warn!(full_short_url = %url, "Lock unavailable, reading store without it");
                self.load_from_store(url).await
            }
            LockTimeoutFallback::NotFound => Err(ResolveError::NotFound),
            LockTimeoutFallback::Error => Err(ResolveError::LockTimeout {
                key,
                waited: self.settings.lock.wait.saturating_mul(rounds),
            }),
        }
    }

    /// Query the store and cache the classified result.
    async fn load_from_store(&self, url: &FullShortUrl) -> ResolveResult<Resolution> {
        metrics::STORE_LOADS.inc();
        let Some(link) = self.links.find_by_url(url).await? else {
            tracing::debug!(full_short_url = %url, "No stored link");
            self.cache_negative(url).await;
            return Err(ResolveError::NotFound);
        };

        let now = OffsetDateTime::now_utc();
        let eligibility = link.eligibility(now);
        let ttl = match eligibility {
            Eligibility::Eligible => link.cache_ttl(now, self.settings.positive_ttl),
            _ => None,
        };
        let Some(ttl) = ttl else {
            tracing::debug!(full_short_url = %url, gid = %link.gid, ?eligibility, "Stored link is not eligible");
            self.cache_negative(url).await;
            return Err(ResolveError::NotFound);
        };

        if let Err(e) = self
            .cache
            .set(&keys::goto_key(url), &link.origin_url, Some(ttl))
            .await
        {
            metrics::CACHE_WRITE_FAILURES.inc();
            tracing::error!(full_short_url = %url, error = %e, "Failed to cache resolved link");
        }
        tracing::debug!(full_short_url = %url, gid = %link.gid, ttl_secs = ttl.as_secs(), "Loaded link from store");

        Ok(Resolution {
            full_short_url: link.full_short_url,
            origin_url: link.origin_url,
            gid: Some(link.gid),
            source: ResolutionSource::Store,
        })
    }

    async fn cache_negative(&self, url: &FullShortUrl) {
        if let Err(e) = self
            .cache
            .set(
                &keys::goto_is_null_key(url),
                keys::NEGATIVE_MARKER,
                Some(self.settings.negative_ttl),
            )
            .await
        {
            metrics::CACHE_WRITE_FAILURES.inc();
            tracing::error!(full_short_url = %url, error = %e, "Failed to cache link absence");
        }
    }

    fn publish_access(&self, resolution: &Resolution, access: AccessContext) {
        let event = AccessEvent {
            full_short_url: resolution.full_short_url.to_string(),
            gid: resolution.gid.clone(),
            accessed_at: OffsetDateTime::now_utc(),
            remote_addr: access.remote_addr,
            user_agent: access.user_agent,
            referer: access.referer,
        };
        let stats = &self.stats;
        if std::panic::catch_unwind(AssertUnwindSafe(|| stats.publish(event))).is_err() {
            metrics::record_stats_dropped("panic");
            tracing::warn!(full_short_url = %resolution.full_short_url, "Stats publisher panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::NoopStatsPublisher;
    use async_trait::async_trait;
    use shortlink_cache::{CacheError, CacheResult};
    use shortlink_core::{EnableStatus, ShortLink, ValidityMode};
    use shortlink_metadata::{ShardRouter, SqliteStore};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn settings() -> ResolverSettings {
        let mut config = AppConfig::for_testing(2);
        config.server.default_domain = "s.ly".to_string();
        config.lock.wait_ms = 50;
        ResolverSettings::from_config(&config)
    }

    async fn repo() -> LinkRepository {
        let store = Arc::new(SqliteStore::in_memory(2).await.unwrap());
        LinkRepository::new(store, ShardRouter::hash_mod(2).unwrap()).unwrap()
    }

    fn link(short_uri: &str) -> ShortLink {
        let now = OffsetDateTime::now_utc();
        ShortLink {
            gid: "g1".to_string(),
            full_short_url: FullShortUrl::new("s.ly", short_uri).unwrap(),
            origin_url: "https://example.com".to_string(),
            validity: ValidityMode::Permanent,
            status: EnableStatus::Enabled,
            deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    async fn seeded(backends: &CacheBackends, repo: &LinkRepository, link: &ShortLink) {
        repo.create(link).await.unwrap();
        let filter = keys::filter_name(link.domain());
        backends.filter.init_filter(&filter, 1_000, 0.001).await.unwrap();
        backends
            .filter
            .add(&filter, link.full_short_url.as_str())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolve_loads_then_serves_from_cache() {
        let (backends, _) = CacheBackends::in_memory();
        let repo = repo().await;
        let link = link("abc123");
        seeded(&backends, &repo, &link).await;
        let resolver = Resolver::new(backends.clone(), repo, Arc::new(NoopStatsPublisher), settings());

        let first = resolver
            .resolve_in("s.ly", "abc123", AccessContext::default())
            .await
            .unwrap();
        assert_eq!(first.origin_url, "https://example.com");
        assert_eq!(first.source, ResolutionSource::Store);
        assert_eq!(first.gid.as_deref(), Some("g1"));

        let cached = backends
            .cache
            .get(&keys::goto_key(&link.full_short_url))
            .await
            .unwrap();
        assert_eq!(cached.as_deref(), Some("https://example.com"));

        let second = resolver
            .resolve_in("s.ly", "abc123", AccessContext::default())
            .await
            .unwrap();
        assert_eq!(second.source, ResolutionSource::Cache);
        assert_eq!(resolver.resolve("abc123").await.unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn test_malformed_identifier_is_not_found() {
        let (backends, _) = CacheBackends::in_memory();
        let resolver = Resolver::new(backends, repo().await, Arc::new(NoopStatsPublisher), settings());
        let err = resolver.resolve("../etc").await.unwrap_err();
        assert_eq!(err, ResolveError::NotFound);
    }

    #[tokio::test]
    async fn test_domain_is_case_insensitive() {
        let (backends, _) = CacheBackends::in_memory();
        let repo = repo().await;
        seeded(&backends, &repo, &link("abc123")).await;
        let resolver = Resolver::new(backends, repo, Arc::new(NoopStatsPublisher), settings());

        let resolution = resolver
            .resolve_in("S.LY", "abc123", AccessContext::default())
            .await
            .unwrap();
        assert_eq!(resolution.full_short_url.as_str(), "s.ly/abc123");
        assert_eq!(resolution.origin_url, "https://example.com");
    }

    #[tokio::test]
    async fn test_unbounded_positive_ttl_is_cached_without_expiry() {
        let (backends, cache) = CacheBackends::in_memory();
        let repo = repo().await;
        let link = link("abc123");
        seeded(&backends, &repo, &link).await;
        let mut settings = settings();
        settings.positive_ttl = Duration::from_secs(u64::MAX);
        let resolver = Resolver::new(backends, repo, Arc::new(NoopStatsPublisher), settings);

        assert_eq!(resolver.resolve("abc123").await.unwrap(), "https://example.com");
        assert_eq!(cache.ttl(&keys::goto_key(&link.full_short_url)), Some(Duration::MAX));
    }

    #[tokio::test]
    async fn test_disabled_link_is_cached_negatively() {
        let (backends, _) = CacheBackends::in_memory();
        let repo = repo().await;
        let mut link = link("off001");
        link.status = EnableStatus::Disabled;
        seeded(&backends, &repo, &link).await;
        let resolver = Resolver::new(backends.clone(), repo, Arc::new(NoopStatsPublisher), settings());

        assert_eq!(resolver.resolve("off001").await.unwrap_err(), ResolveError::NotFound);
        assert!(
            backends
                .cache
                .exists(&keys::goto_is_null_key(&link.full_short_url))
                .await
                .unwrap()
        );
        assert!(
            !backends
                .cache
                .exists(&keys::goto_key(&link.full_short_url))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_custom_validity_caps_positive_ttl() {
        let (backends, cache) = CacheBackends::in_memory();
        let repo = repo().await;
        let mut link = link("soon01");
        link.validity = ValidityMode::Custom {
            until: OffsetDateTime::now_utc() + time::Duration::minutes(5),
        };
        seeded(&backends, &repo, &link).await;
        let resolver = Resolver::new(backends, repo, Arc::new(NoopStatsPublisher), settings());

        resolver.resolve("soon01").await.unwrap();
        let ttl = cache.ttl(&keys::goto_key(&link.full_short_url)).unwrap();
        assert!(ttl <= Duration::from_secs(300), "{ttl:?}");
        assert!(ttl > Duration::from_secs(200), "{ttl:?}");
    }

    async fn held_lock_resolver(fallback: LockTimeoutFallback) -> (Resolver, CacheBackends) {
        let (backends, _) = CacheBackends::in_memory();
        let repo = repo().await;
        let link = link("busy01");
        seeded(&backends, &repo, &link).await;
        backends
            .lock
            .try_lock(
                &keys::goto_lock_key(&link.full_short_url),
                Duration::ZERO,
                Duration::from_secs(30),
            )
            .await
            .unwrap()
            .unwrap();

        let mut settings = settings();
        settings.lock_retry_attempts = 1;
        settings.timeout_fallback = fallback;
        let resolver = Resolver::new(backends.clone(), repo, Arc::new(NoopStatsPublisher), settings);
        (resolver, backends)
    }

    #[tokio::test]
    async fn test_lock_timeout_direct_read() {
        let (resolver, _) = held_lock_resolver(LockTimeoutFallback::DirectRead).await;
        assert_eq!(resolver.resolve("busy01").await.unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn test_lock_timeout_not_found() {
        let (resolver, backends) = held_lock_resolver(LockTimeoutFallback::NotFound).await;
        assert_eq!(resolver.resolve("busy01").await.unwrap_err(), ResolveError::NotFound);
        // Nothing was cached, so a later caller still gets a real answer.
        let url = FullShortUrl::new("s.ly", "busy01").unwrap();
        assert!(!backends.cache.exists(&keys::goto_is_null_key(&url)).await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_timeout_error() {
        let (resolver, _) = held_lock_resolver(LockTimeoutFallback::Error).await;
        let err = resolver.resolve("busy01").await.unwrap_err();
        match &err {
            ResolveError::LockTimeout { key, waited } => {
                assert_eq!(key.as_str(), "short-link:lock:goto:s.ly/busy01");
                assert_eq!(*waited, Duration::from_millis(100));
            }
            other => panic!("expected lock timeout, got {other:?}"),
        }
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_lock_timeout_rechecks_cache() {
        let (resolver, backends) = held_lock_resolver(LockTimeoutFallback::Error).await;
        let url = FullShortUrl::new("s.ly", "busy01").unwrap();
        let cache = backends.cache.clone();
        // Another holder populates the cache while this caller waits.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cache
                .set(&keys::goto_key(&url), "https://example.com/warm", None)
                .await
                .unwrap();
        });
        assert_eq!(
            resolver.resolve("busy01").await.unwrap(),
            "https://example.com/warm"
        );
    }

    /// Fails the first `failures` reads, then behaves like an empty cache.
    struct FlakyCache {
        failures: AtomicU32,
    }

    #[async_trait]
    impl CacheStore for FlakyCache {
        async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(CacheError::Backend("connection refused".to_string()));
            }
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> CacheResult<()> {
            Ok(())
        }
        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Ok(false)
        }
        async fn exists(&self, _key: &str) -> CacheResult<bool> {
            Ok(false)
        }
        async fn expire(&self, _key: &str, _ttl: Duration) -> CacheResult<bool> {
            Ok(false)
        }
        async fn field_set(&self, _key: &str, _field: &str, _value: &str) -> CacheResult<()> {
            Ok(())
        }
        async fn field_get(&self, _key: &str, _field: &str) -> CacheResult<Option<String>> {
            Ok(None)
        }
        async fn field_delete_all(&self, _key: &str) -> CacheResult<bool> {
            Ok(false)
        }
    }

    fn flaky_backends(failures: u32) -> CacheBackends {
        let (mut backends, _) = CacheBackends::in_memory();
        backends.cache = Arc::new(FlakyCache {
            failures: AtomicU32::new(failures),
        });
        backends
    }

    #[tokio::test]
    async fn test_backend_failure_is_retried() {
        let backends = flaky_backends(2);
        let repo = repo().await;
        seeded(&backends, &repo, &link("flaky1")).await;
        let mut settings = settings();
        settings.retry.backend_retry_attempts = 2;
        let resolver = Resolver::new(backends, repo, Arc::new(NoopStatsPublisher), settings);

        assert_eq!(resolver.resolve("flaky1").await.unwrap(), "https://example.com");
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_not_not_found() {
        let backends = flaky_backends(10);
        let mut settings = settings();
        settings.retry.backend_retry_attempts = 1;
        let resolver = Resolver::new(backends, repo().await, Arc::new(NoopStatsPublisher), settings);

        let err = resolver.resolve("flaky1").await.unwrap_err();
        assert!(matches!(err, ResolveError::UpstreamUnavailable(_)), "{err:?}");
    }

    struct PanickingPublisher;

    impl StatsPublisher for PanickingPublisher {
        fn publish(&self, _event: AccessEvent) {
            panic!("stats backend exploded");
        }
    }

    #[tokio::test]
    async fn test_stats_panic_does_not_fail_resolution() {
        let (backends, _) = CacheBackends::in_memory();
        let repo = repo().await;
        seeded(&backends, &repo, &link("stat01")).await;
        let resolver = Resolver::new(backends, repo, Arc::new(PanickingPublisher), settings());

        assert_eq!(resolver.resolve("stat01").await.unwrap(), "https://example.com");
    }
}
