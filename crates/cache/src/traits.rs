//! Cache, existence filter and lock trait definitions.
//!
//! Backends only need to make each single operation atomic; callers compose
//! them without transactions and accept TTL-bounded staleness.

use crate::error::CacheResult;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Keyed string cache with TTLs plus hash-like field access.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
    /// Get a live value.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Set a value; `None` keeps it until deleted. Last write wins.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a key. Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Check whether a live key exists.
    async fn exists(&self, key: &str) -> CacheResult<bool>;

    /// Reset the TTL of a live key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Set one field of a hash-like key, creating the key if needed.
    async fn field_set(&self, key: &str, field: &str, value: &str) -> CacheResult<()>;

    /// Get one field of a hash-like key.
    async fn field_get(&self, key: &str, field: &str) -> CacheResult<Option<String>>;

    /// Drop every field of a hash-like key. Returns whether anything was removed.
    async fn field_delete_all(&self, key: &str) -> CacheResult<bool>;

    /// Verify the backend is reachable.
    async fn health_check(&self) -> CacheResult<()> {
        Ok(())
    }
}

/// Namespaced, append-only probabilistic set.
///
/// `contains == false` is authoritative for every element ever added;
/// `contains == true` may be a false positive. There is no removal.
#[async_trait]
pub trait ExistenceFilter: Send + Sync + 'static {
    /// Create the named filter sized for the given capacity and error rate.
    /// Idempotent: returns `false` without touching an existing filter.
    async fn init_filter(
        &self,
        name: &str,
        expected_insertions: usize,
        false_positive_rate: f64,
    ) -> CacheResult<bool>;

    /// Membership test. An uninitialized filter is an empty set.
    async fn contains(&self, name: &str, element: &str) -> CacheResult<bool>;

    /// Add one element. Fails if the filter was never initialized.
    async fn add(&self, name: &str, element: &str) -> CacheResult<()>;

    /// Add many elements. Fails if the filter was never initialized.
    async fn add_all(&self, name: &str, elements: &[String]) -> CacheResult<()>;
}

/// Proof of ownership for an acquired lock.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct LockToken(Uuid);

impl LockToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LockToken({})", self.0)
    }
}

/// Wait and lease budgets for a lock acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockOptions {
    /// Longest time to block waiting for the lock.
    pub wait: Duration,
    /// Time after which a held lock expires on its own.
    pub lease: Duration,
}

impl LockOptions {
    pub fn new(wait: Duration, lease: Duration) -> Self {
        Self { wait, lease }
    }
}

/// Cluster-wide per-key mutual exclusion with bounded wait and lease.
///
/// Prefer [`crate::lock::with_lock`] or [`crate::lock::acquire`], which
/// guarantee release on every exit path.
#[async_trait]
pub trait DistributedLock: Send + Sync + 'static {
    /// Block up to `wait` trying to acquire `key`. `None` means the wait
    /// budget ran out. An acquired lock expires after `lease` regardless.
    async fn try_lock(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
    ) -> CacheResult<Option<LockToken>>;

    /// Release `key` if `token` still owns it. Returns false when the lease
    /// already expired or another holder took over.
    async fn unlock(&self, key: &str, token: &LockToken) -> CacheResult<bool>;
}
