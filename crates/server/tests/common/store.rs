//! Instrumented link store.

use async_trait::async_trait;
use shortlink_metadata::query::{Dialect, RenderedQuery};
use shortlink_metadata::{LinkStore, MetadataResult};
use shortlink_metadata::models::{LinkRouteRow, LinkRow};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Wraps a store and counts every read that reaches it.
#[allow(dead_code)]
pub struct CountingStore {
    inner: Arc<dyn LinkStore>,
    reads: AtomicU64,
    read_delay: Duration,
}

#[allow(dead_code)]
impl CountingStore {
    pub fn new(inner: Arc<dyn LinkStore>) -> Self {
        Self::with_delay(inner, Duration::ZERO)
    }

    /// Every read sleeps `read_delay` first, widening race windows.
    pub fn with_delay(inner: Arc<dyn LinkStore>, read_delay: Duration) -> Self {
        Self {
            inner,
            reads: AtomicU64::new(0),
            read_delay,
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    async fn count(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
    }
}

#[async_trait]
impl LinkStore for CountingStore {
    fn dialect(&self) -> Dialect {
        self.inner.dialect()
    }

    fn shard_count(&self) -> u32 {
        self.inner.shard_count()
    }

    async fn fetch_links(&self, query: &RenderedQuery) -> MetadataResult<Vec<LinkRow>> {
        self.count().await;
        self.inner.fetch_links(query).await
    }

    async fn fetch_routes(&self, query: &RenderedQuery) -> MetadataResult<Vec<LinkRouteRow>> {
        self.count().await;
        self.inner.fetch_routes(query).await
    }

    async fn fetch_count(&self, query: &RenderedQuery) -> MetadataResult<i64> {
        self.count().await;
        self.inner.fetch_count(query).await
    }

    async fn execute(&self, query: &RenderedQuery) -> MetadataResult<u64> {
        self.inner.execute(query).await
    }

    async fn migrate(&self) -> MetadataResult<()> {
        self.inner.migrate().await
    }

    async fn health_check(&self) -> MetadataResult<()> {
        self.inner.health_check().await
    }
}
