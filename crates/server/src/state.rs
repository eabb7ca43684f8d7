//! Application state shared across handlers.

use crate::links::LinkService;
use crate::resolver::Resolver;
use shortlink_cache::CacheBackends;
use shortlink_core::config::AppConfig;
use shortlink_metadata::LinkRepository;
use std::sync::Arc;

/// Application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Cache, filter and lock backends.
    pub backends: CacheBackends,
    /// Sharded link persistence.
    pub repository: LinkRepository,
    /// Read path.
    pub resolver: Arc<Resolver>,
    /// Write path.
    pub links: Arc<LinkService>,
}
