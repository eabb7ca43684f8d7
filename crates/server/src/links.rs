//! Link lifecycle: creation, recycle bin and counting.
//!
//! Every state change keeps the cache and the existence filter consistent
//! with the store: creation adds to the filter and warms the positive entry,
//! disabling or removing drops the positive entry, recovering drops the
//! negative one.

use crate::error::{ResolveError, ResolveResult};
use crate::metrics;
use shortlink_cache::{
    CacheBackends, CacheStore, DistributedLock, ExistenceFilter, LockOptions, with_lock,
};
use shortlink_core::config::{AppConfig, FilterConfig};
use shortlink_core::link::validate_origin_url;
use shortlink_core::{
    EnableStatus, FullShortUrl, MAX_GENERATE_ATTEMPTS, ShortLink, ValidityMode, keys, short_uri,
};
use shortlink_metadata::{LinkRepository, MetadataError};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

/// A request to create a short link.
#[derive(Clone, Debug)]
pub struct CreateLink {
    pub gid: String,
    /// Defaults to the configured default domain.
    pub domain: Option<String>,
    pub origin_url: String,
    /// Use this identifier instead of generating one.
    pub custom_short_uri: Option<String>,
    pub validity: ValidityMode,
}

#[derive(Clone, Debug)]
pub struct LinkServiceSettings {
    pub default_domain: String,
    pub positive_ttl: Duration,
    pub filter: FilterConfig,
    pub lock: LockOptions,
}

impl LinkServiceSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_domain: config.server.default_domain.clone(),
            positive_ttl: config.cache.positive_ttl(),
            filter: config.filter.clone(),
            lock: LockOptions::new(config.lock.wait(), config.lock.lease()),
        }
    }
}

pub struct LinkService {
    cache: Arc<dyn CacheStore>,
    filter: Arc<dyn ExistenceFilter>,
    lock: Arc<dyn DistributedLock>,
    links: LinkRepository,
    settings: LinkServiceSettings,
}

impl LinkService {
    pub fn new(backends: CacheBackends, links: LinkRepository, settings: LinkServiceSettings) -> Self {
        Self {
            cache: backends.cache,
            filter: backends.filter,
            lock: backends.lock,
            links,
            settings,
        }
    }

    /// Create a link and make it resolvable.
    ///
    /// Returns [`ResolveError::Conflict`] if the full short URL is taken, or
    /// if no free identifier turned up within the attempt budget.
    pub async fn create(&self, request: CreateLink) -> ResolveResult<ShortLink> {
        if request.gid.trim().is_empty() {
            return Err(ResolveError::InvalidInput("gid cannot be empty".to_string()));
        }
        validate_origin_url(&request.origin_url)?;

        let now = OffsetDateTime::now_utc();
        if request.validity.is_expired(now) {
            return Err(ResolveError::InvalidInput(
                "validity window has already ended".to_string(),
            ));
        }

        let domain = request
            .domain
            .unwrap_or_else(|| self.settings.default_domain.clone())
            .to_ascii_lowercase();
        let filter = keys::filter_name(&domain);
        self.filter
            .init_filter(
                &filter,
                self.settings.filter.expected_insertions,
                self.settings.filter.false_positive_rate,
            )
            .await?;

        let full_short_url = match &request.custom_short_uri {
            Some(custom) => FullShortUrl::new(&domain, custom)?,
            None => self.generate(&domain, &filter, &request.origin_url).await?,
        };

        let link = ShortLink {
            gid: request.gid,
            full_short_url,
            origin_url: request.origin_url,
            validity: request.validity,
            status: EnableStatus::Enabled,
            deleted: false,
            created_at: now,
            updated_at: now,
        };

        let links = &self.links;
        let record = &link;
        with_lock(
            &self.lock,
            &keys::create_lock_key(&link.gid),
            self.settings.lock,
            move || async move { links.create(record).await.map_err(ResolveError::from) },
        )
        .await?;

        self.filter.add(&filter, link.full_short_url.as_str()).await?;
        self.warm(&link, now).await;

        metrics::LINKS_CREATED.inc();
        tracing::info!(
            full_short_url = %link.full_short_url,
            gid = %link.gid,
            "Short link created"
        );
        Ok(link)
    }

    /// Pick an identifier the domain filter has not seen. A filter hit may
    /// be a false positive, but skipping it costs only another attempt.
    async fn generate(
        &self,
        domain: &str,
        filter: &str,
        origin_url: &str,
    ) -> ResolveResult<FullShortUrl> {
        for attempt in 1..=MAX_GENERATE_ATTEMPTS {
            let candidate =
                FullShortUrl::new(domain, &short_uri::generate(origin_url, Uuid::new_v4()))?;
            if !self.filter.contains(filter, candidate.as_str()).await? {
                return Ok(candidate);
            }
            tracing::debug!(candidate = %candidate, attempt, "Generated identifier already taken");
        }
        Err(ResolveError::Conflict(format!(
            "no free short identifier on {domain} after {MAX_GENERATE_ATTEMPTS} attempts"
        )))
    }

    /// Seed the positive entry and clear any absence marker left by lookups
    /// that raced the creation. Failures only cost a later store load.
    async fn warm(&self, link: &ShortLink, now: OffsetDateTime) {
        let url = &link.full_short_url;
        if let Some(ttl) = link.cache_ttl(now, self.settings.positive_ttl)
            && let Err(e) = self
                .cache
                .set(&keys::goto_key(url), &link.origin_url, Some(ttl))
                .await
        {
            metrics::CACHE_WRITE_FAILURES.inc();
            tracing::warn!(full_short_url = %url, error = %e, "Failed to warm cache for new link");
        }
        if let Err(e) = self.cache.delete(&keys::goto_is_null_key(url)).await {
            metrics::CACHE_WRITE_FAILURES.inc();
            tracing::warn!(full_short_url = %url, error = %e, "Failed to clear absence marker for new link");
        }
    }

    /// Move a link to the recycle bin.
    pub async fn disable(&self, gid: &str, url: &FullShortUrl) -> ResolveResult<()> {
        let now = OffsetDateTime::now_utc();
        if !self
            .links
            .set_enable_status(gid, url, EnableStatus::Disabled, now)
            .await?
        {
            return Err(ResolveError::NotFound);
        }
        self.cache.delete(&keys::goto_key(url)).await?;
        tracing::info!(full_short_url = %url, gid = %gid, "Short link disabled");
        Ok(())
    }

    /// Restore a link from the recycle bin.
    pub async fn recover(&self, gid: &str, url: &FullShortUrl) -> ResolveResult<()> {
        let now = OffsetDateTime::now_utc();
        if !self
            .links
            .set_enable_status(gid, url, EnableStatus::Enabled, now)
            .await?
        {
            return Err(ResolveError::NotFound);
        }
        self.cache.delete(&keys::goto_is_null_key(url)).await?;
        tracing::info!(full_short_url = %url, gid = %gid, "Short link recovered");
        Ok(())
    }

    /// Soft-delete a link from the recycle bin. Enabled links must be
    /// disabled first.
    pub async fn remove(&self, gid: &str, url: &FullShortUrl) -> ResolveResult<()> {
        let now = OffsetDateTime::now_utc();
        if !self.links.soft_delete(gid, url, now).await? {
            return match self.links.find_link(gid, url).await? {
                Some(link) if !link.deleted => Err(ResolveError::InvalidInput(format!(
                    "{url} must be disabled before removal"
                ))),
                _ => Err(ResolveError::NotFound),
            };
        }
        self.cache.delete(&keys::goto_key(url)).await?;
        tracing::info!(full_short_url = %url, gid = %gid, "Short link removed");
        Ok(())
    }

    /// Live, enabled links in a group.
    pub async fn count(&self, gid: &str) -> ResolveResult<u64> {
        let total = self.links.count_live(gid).await?;
        u64::try_from(total).map_err(|_| {
            ResolveError::from(MetadataError::Internal(format!(
                "negative link count {total} for group {gid}"
            )))
        })
    }
}
