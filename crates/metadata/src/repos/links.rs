//! Link and route persistence.
//!
//! Two logical tables back every link: `link_routes` (placed by full short
//! URL) answers "which group owns this URL", and `links` (placed by gid)
//! holds the record. A lookup by URL reads the route first, then the link.

use crate::error::{MetadataError, MetadataResult};
use crate::models::{LINK_COLUMNS, LINKS_TABLE, LinkRouteRow, LinkRow, ROUTES_TABLE};
use crate::query::{AggregateFn, Dialect, Operator, QueryBuilder, SortOrder};
use crate::shard::{ShardId, ShardRouter};
use crate::store::LinkStore;
use shortlink_core::{EnableStatus, FullShortUrl, ShortLink};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone)]
pub struct LinkRepository {
    store: Arc<dyn LinkStore>,
    router: ShardRouter,
}

impl LinkRepository {
    pub fn new(store: Arc<dyn LinkStore>, router: ShardRouter) -> MetadataResult<Self> {
        if store.shard_count() != router.shard_count() {
            return Err(MetadataError::Config(format!(
                "router maps keys onto {} shards but the store has {}",
                router.shard_count(),
                store.shard_count()
            )));
        }
        Ok(Self { store, router })
    }

    pub fn router(&self) -> &ShardRouter {
        &self.router
    }

    pub fn store(&self) -> &Arc<dyn LinkStore> {
        &self.store
    }

    fn dialect(&self) -> Dialect {
        self.store.dialect()
    }

    /// Which group owns `url`, if anyone.
    pub async fn find_route(&self, url: &FullShortUrl) -> MetadataResult<Option<LinkRouteRow>> {
        let query = QueryBuilder::select()
            .table(ROUTES_TABLE)
            .columns(["gid", "full_short_url"])
            .filter("full_short_url", Operator::Eq, url.as_str())
            .limit(1)
            .build(self.dialect())?;
        let rows = self
            .router
            .route(url.as_str(), self.store.fetch_routes(&query))
            .await?;
        Ok(rows.into_iter().next())
    }

    /// The record for `url` within group `gid`, whatever its state.
    pub async fn find_link(&self, gid: &str, url: &FullShortUrl) -> MetadataResult<Option<ShortLink>> {
        let query = QueryBuilder::select()
            .table(LINKS_TABLE)
            .columns(LINK_COLUMNS)
            .filter("gid", Operator::Eq, gid)
            .filter("full_short_url", Operator::Eq, url.as_str())
            .limit(1)
            .build(self.dialect())?;
        let rows = self.router.route(gid, self.store.fetch_links(&query)).await?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(ShortLink::try_from(row)?)),
            None => Ok(None),
        }
    }

    /// Route, then record. A route without a record is logged and treated
    /// as absent.
    pub async fn find_by_url(&self, url: &FullShortUrl) -> MetadataResult<Option<ShortLink>> {
        let Some(route) = self.find_route(url).await? else {
            return Ok(None);
        };
        let link = self.find_link(&route.gid, url).await?;
        if link.is_none() {
            tracing::warn!(
                full_short_url = %url,
                gid = %route.gid,
                "Route points at a missing link record"
            );
        }
        Ok(link)
    }

    /// Persist a new link. The route insert doubles as the global uniqueness
    /// check on the full short URL; if the record insert then fails the
    /// route is removed again.
    pub async fn create(&self, link: &ShortLink) -> MetadataResult<()> {
        let url = link.full_short_url.as_str();
        let route = QueryBuilder::insert()
            .table(ROUTES_TABLE)
            .set("gid", &link.gid)
            .set("full_short_url", url)
            .build(self.dialect())?;
        self.router
            .route(url, self.store.execute(&route))
            .await
            .map_err(|e| match e {
                MetadataError::AlreadyExists(_) => {
                    MetadataError::AlreadyExists(format!("short link {url}"))
                }
                other => other,
            })?;

        let row = LinkRow::from_link(link);
        let insert = QueryBuilder::insert()
            .table(LINKS_TABLE)
            .set("gid", row.gid)
            .set("domain", row.domain)
            .set("short_uri", row.short_uri)
            .set("full_short_url", row.full_short_url)
            .set("origin_url", row.origin_url)
            .set("valid_date_type", row.valid_date_type)
            .set("valid_date", row.valid_date)
            .set("enable_status", row.enable_status)
            .set("del_flag", row.del_flag)
            .set("create_time", row.create_time)
            .set("update_time", row.update_time)
            .build(self.dialect())?;

        if let Err(err) = self
            .router
            .route(&link.gid, self.store.execute(&insert))
            .await
        {
            let undo = QueryBuilder::delete()
                .table(ROUTES_TABLE)
                .filter("full_short_url", Operator::Eq, url)
                .filter("gid", Operator::Eq, &link.gid)
                .build(self.dialect())?;
            if let Err(undo_err) = self.router.route(url, self.store.execute(&undo)).await {
                tracing::error!(
                    full_short_url = %url,
                    error = %undo_err,
                    "Failed to remove route after record insert failed"
                );
            }
            return Err(err);
        }
        Ok(())
    }

    /// Enable or disable a live link. Returns whether a row changed.
    pub async fn set_enable_status(
        &self,
        gid: &str,
        url: &FullShortUrl,
        status: EnableStatus,
        now: OffsetDateTime,
    ) -> MetadataResult<bool> {
        let query = QueryBuilder::update()
            .table(LINKS_TABLE)
            .set("enable_status", status.code())
            .set("update_time", now)
            .filter("gid", Operator::Eq, gid)
            .filter("full_short_url", Operator::Eq, url.as_str())
            .filter("del_flag", Operator::Eq, 0)
            .build(self.dialect())?;
        let affected = self.router.route(gid, self.store.execute(&query)).await?;
        Ok(affected > 0)
    }

    /// Soft-delete a link that is already disabled. Returns whether a row
    /// changed. The route is kept so the identifier is never reissued.
    pub async fn soft_delete(
        &self,
        gid: &str,
        url: &FullShortUrl,
        now: OffsetDateTime,
    ) -> MetadataResult<bool> {
        let query = QueryBuilder::update()
            .table(LINKS_TABLE)
            .set("del_flag", 1)
            .set("update_time", now)
            .filter("gid", Operator::Eq, gid)
            .filter("full_short_url", Operator::Eq, url.as_str())
            .filter("del_flag", Operator::Eq, 0)
            .filter("enable_status", Operator::Eq, EnableStatus::Disabled.code())
            .build(self.dialect())?;
        let affected = self.router.route(gid, self.store.execute(&query)).await?;
        Ok(affected > 0)
    }

    /// Live, enabled links in a group.
    pub async fn count_live(&self, gid: &str) -> MetadataResult<i64> {
        let query = QueryBuilder::aggregate(AggregateFn::Count, None, "total")
            .table(LINKS_TABLE)
            .filter("gid", Operator::Eq, gid)
            .filter("del_flag", Operator::Eq, 0)
            .filter("enable_status", Operator::Eq, EnableStatus::Enabled.code())
            .build(self.dialect())?;
        self.router.route(gid, self.store.fetch_count(&query)).await
    }

    /// Every route stored on one shard, ordered by URL.
    pub async fn routes_on(&self, shard: ShardId) -> MetadataResult<Vec<LinkRouteRow>> {
        let query = QueryBuilder::select()
            .table(ROUTES_TABLE)
            .columns(["gid", "full_short_url"])
            .order_by("full_short_url", SortOrder::Asc)
            .build(self.dialect())?;
        self.router
            .on_shard(shard, self.store.fetch_routes(&query))
            .await
    }

    /// Every route on every shard.
    pub async fn all_routes(&self) -> MetadataResult<Vec<LinkRouteRow>> {
        let mut routes = Vec::new();
        for shard in self.router.shards() {
            let batch = self.routes_on(shard).await?;
            tracing::debug!(shard = %shard, routes = batch.len(), "Loaded routes");
            routes.extend(batch);
        }
        Ok(routes)
    }
}
