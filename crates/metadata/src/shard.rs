//! Shard routing.
//!
//! A call is routed by running it inside [`ShardRouter::route`], which binds
//! the chosen [`ShardId`] to the current task for exactly the duration of the
//! call. Stores read it back with [`current_shard`]. The binding is undone on
//! every exit path: normal return, error, panic and cancellation. A nested
//! `route` shadows the outer binding and restores it on exit.

use crate::error::{MetadataError, MetadataResult};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

tokio::task_local! {
    static SHARD_CONTEXT: ShardId;
}

/// A physical partition of the link store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardId(u32);

impl ShardId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

/// Routing state of the current task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteState {
    Unrouted,
    Routed(ShardId),
}

/// The shard bound to the current task, if any.
pub fn current_shard() -> Option<ShardId> {
    SHARD_CONTEXT.try_with(|shard| *shard).ok()
}

pub fn route_state() -> RouteState {
    current_shard().map_or(RouteState::Unrouted, RouteState::Routed)
}

/// Maps a shard key to a partition. Must be deterministic for the lifetime
/// of the data: the same key always yields the same shard.
pub trait ShardStrategy: Send + Sync + 'static {
    fn determine_shard(&self, key: &str) -> ShardId;

    fn shard_count(&self) -> u32;
}

/// `xxh3_64(key) mod shard_count`.
#[derive(Clone, Debug)]
pub struct HashModStrategy {
    shard_count: u32,
}

impl HashModStrategy {
    pub fn new(shard_count: u32) -> MetadataResult<Self> {
        if shard_count == 0 {
            return Err(MetadataError::Config(
                "shard count must be at least 1".to_string(),
            ));
        }
        Ok(Self { shard_count })
    }
}

impl ShardStrategy for HashModStrategy {
    fn determine_shard(&self, key: &str) -> ShardId {
        ShardId((xxh3_64(key.as_bytes()) % u64::from(self.shard_count)) as u32)
    }

    fn shard_count(&self) -> u32 {
        self.shard_count
    }
}

/// Runs store calls against the shard their key maps to.
#[derive(Clone)]
pub struct ShardRouter {
    strategy: Arc<dyn ShardStrategy>,
}

impl ShardRouter {
    pub fn new(strategy: Arc<dyn ShardStrategy>) -> Self {
        Self { strategy }
    }

    pub fn hash_mod(shard_count: u32) -> MetadataResult<Self> {
        Ok(Self::new(Arc::new(HashModStrategy::new(shard_count)?)))
    }

    pub fn shard_count(&self) -> u32 {
        self.strategy.shard_count()
    }

    /// Every shard id, ascending.
    pub fn shards(&self) -> impl Iterator<Item = ShardId> + use<> {
        (0..self.strategy.shard_count()).map(ShardId)
    }

    pub fn shard_for(&self, key: &str) -> ShardId {
        self.strategy.determine_shard(key)
    }

    /// Run `operation` with the shard for `key` bound to this task.
    pub async fn route<F: Future>(&self, key: &str, operation: F) -> F::Output {
        let shard = self.shard_for(key);
        tracing::trace!(shard = %shard, "Routing call");
        SHARD_CONTEXT.scope(shard, operation).await
    }

    /// Like [`ShardRouter::route`], with the shard key pulled out of `input`
    /// by `extract`.
    pub async fn route_by<T, K, F>(&self, input: &T, extract: K, operation: F) -> F::Output
    where
        T: ?Sized,
        K: FnOnce(&T) -> &str,
        F: Future,
    {
        let key = extract(input);
        self.route(key, operation).await
    }

    /// Run `operation` on an explicit shard, for fan-out over all shards.
    pub async fn on_shard<F: Future>(&self, shard: ShardId, operation: F) -> F::Output {
        SHARD_CONTEXT.scope(shard, operation).await
    }
}

impl fmt::Debug for ShardRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardRouter")
            .field("shard_count", &self.strategy.shard_count())
            .finish()
    }
}
