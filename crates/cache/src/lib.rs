//! Cache, existence filter and lock primitives for the shortlink resolver.
//!
//! This crate provides:
//! - A keyed TTL cache with hash-like field access ([`CacheStore`])
//! - Namespaced append-only existence filters ([`ExistenceFilter`])
//! - Per-key lease locks with scoped release ([`DistributedLock`], [`lock::with_lock`])
//! - In-process backends for all three

pub mod backends;
pub mod error;
pub mod lock;
pub mod traits;

pub use backends::{bloom::BloomFilters, lease::MemoryLock, memory::MemoryCache};
pub use error::{CacheError, CacheResult};
pub use lock::{LockGuard, acquire, with_lock};
pub use traits::{CacheStore, DistributedLock, ExistenceFilter, LockOptions, LockToken};

use std::sync::Arc;

/// The three coordination backends the resolver depends on.
#[derive(Clone)]
pub struct CacheBackends {
    pub cache: Arc<dyn CacheStore>,
    pub filter: Arc<dyn ExistenceFilter>,
    pub lock: Arc<dyn DistributedLock>,
}

impl CacheBackends {
    /// Process-local backends. The returned [`MemoryCache`] handle is the same
    /// instance as `cache`, for spawning its sweeper.
    pub fn in_memory() -> (Self, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        let backends = Self {
            cache: cache.clone(),
            filter: Arc::new(BloomFilters::new()),
            lock: Arc::new(MemoryLock::new()),
        };
        (backends, cache)
    }
}
