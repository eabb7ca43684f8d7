//! In-process lease lock.
//!
//! Waiters park on a [`Notify`] that fires on every release, and also wake
//! when the current lease is due so an abandoned lock is reclaimed on time.

use crate::error::CacheResult;
use crate::traits::{DistributedLock, LockToken};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// Furthest deadline a lease or wait budget is clamped to.
const MAX_SPAN: Duration = Duration::from_secs(100 * 365 * 24 * 3600);

fn clamped_deadline(now: Instant, after: Duration) -> Instant {
    now.checked_add(after.min(MAX_SPAN))
        .or_else(|| now.checked_add(Duration::from_secs(24 * 3600)))
        .unwrap_or(now)
}

#[derive(Debug, Clone)]
struct Lease {
    token: LockToken,
    expires_at: Instant,
}

/// Lease-based mutual exclusion within one process.
#[derive(Default)]
pub struct MemoryLock {
    leases: DashMap<String, Lease>,
    released: Notify,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `key` is currently held by a live lease.
    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        self.leases.get(key).is_some_and(|l| l.expires_at > now)
    }

    /// Single non-blocking acquisition attempt. On contention returns the
    /// instant the current lease runs out.
    fn attempt(&self, key: &str, lease: Duration) -> Result<LockToken, Instant> {
        let now = Instant::now();
        let fresh = Lease {
            token: LockToken::new(),
            expires_at: clamped_deadline(now, lease),
        };
        match self.leases.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                let token = fresh.token.clone();
                vacant.insert(fresh);
                Ok(token)
            }
            Entry::Occupied(mut occupied) if occupied.get().expires_at <= now => {
                tracing::debug!(key = %key, "Reclaiming expired lock lease");
                let token = fresh.token.clone();
                occupied.insert(fresh);
                Ok(token)
            }
            Entry::Occupied(occupied) => Err(occupied.get().expires_at),
        }
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn try_lock(
        &self,
        key: &str,
        wait: Duration,
        lease: Duration,
    ) -> CacheResult<Option<LockToken>> {
        let deadline = clamped_deadline(Instant::now(), wait);
        loop {
            // Register interest before attempting so a release between the
            // attempt and the await is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let lease_end = match self.attempt(key, lease) {
                Ok(token) => return Ok(Some(token)),
                Err(lease_end) => lease_end,
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline.min(lease_end)) => {}
            }
        }
    }

    async fn unlock(&self, key: &str, token: &LockToken) -> CacheResult<bool> {
        let removed = self
            .leases
            .remove_if(key, |_, lease| lease.token == *token)
            .is_some();
        if removed {
            self.released.notify_waiters();
        }
        Ok(removed)
    }
}
