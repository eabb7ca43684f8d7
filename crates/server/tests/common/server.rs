//! Server test utilities.

use crate::common::{CountingStore, RecordingPublisher};
use shortlink_cache::{CacheBackends, MemoryCache};
use shortlink_core::ShortLink;
use shortlink_core::config::AppConfig;
use shortlink_metadata::{LinkStore, SqliteStore};
use shortlink_server::bootstrap::{build_state, seed_filters};
use shortlink_server::stats::StatsPublisher;
use shortlink_server::{AppState, create_router};
use std::sync::Arc;
use std::time::Duration;

pub const SHARDS: u32 = 2;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    pub store: Arc<CountingStore>,
    pub cache: Arc<MemoryCache>,
    pub stats: Arc<RecordingPublisher>,
}

#[allow(dead_code)]
impl TestServer {
    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub fn builder() -> TestServerBuilder {
        let mut config = AppConfig::for_testing(SHARDS);
        config.server.default_domain = "s.ly".to_string();
        TestServerBuilder {
            config,
            links: Vec::new(),
            read_delay: Duration::ZERO,
            publisher: None,
        }
    }
}

#[allow(dead_code)]
pub struct TestServerBuilder {
    pub config: AppConfig,
    links: Vec<ShortLink>,
    read_delay: Duration,
    publisher: Option<Arc<dyn StatsPublisher>>,
}

#[allow(dead_code)]
impl TestServerBuilder {
    /// Persist `link` before filters are seeded.
    pub fn with_link(mut self, link: ShortLink) -> Self {
        self.links.push(link);
        self
    }

    pub fn read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Replace the recording publisher the resolver reports to.
    pub fn publisher(mut self, publisher: Arc<dyn StatsPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub async fn build(self) -> TestServer {
        let sqlite: Arc<dyn LinkStore> = Arc::new(
            SqliteStore::in_memory(SHARDS)
                .await
                .expect("Failed to create link store"),
        );
        let store = Arc::new(CountingStore::with_delay(sqlite, self.read_delay));
        let (backends, cache) = CacheBackends::in_memory();
        let stats = Arc::new(RecordingPublisher::default());
        let publisher = self
            .publisher
            .unwrap_or_else(|| stats.clone() as Arc<dyn StatsPublisher>);

        let state = build_state(self.config, store.clone(), backends, publisher)
            .expect("Failed to build state");

        for link in &self.links {
            state
                .repository
                .create(link)
                .await
                .expect("Failed to persist fixture link");
        }
        seed_filters(
            state.backends.filter.as_ref(),
            &state.repository,
            &state.config.filter,
            &state.config.server.default_domain,
        )
        .await
        .expect("Failed to seed filters");
        store.reset();

        let router = create_router(state.clone());
        TestServer {
            router,
            state,
            store,
            cache,
            stats,
        }
    }
}
