//! Scoped lock acquisition.
//!
//! A [`LockGuard`] releases its lock when explicitly released, and otherwise
//! on drop (panic unwinding or a cancelled future). If no runtime is around to
//! run the release, the lease expiry frees the key.

use crate::error::{CacheError, CacheResult};
use crate::traits::{DistributedLock, LockOptions, LockToken};
use std::future::Future;
use std::sync::Arc;

/// An acquired lock that is released exactly once.
pub struct LockGuard {
    lock: Arc<dyn DistributedLock>,
    key: String,
    token: Option<LockToken>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock now. Returns false if the lease had already expired.
    pub async fn release(mut self) -> CacheResult<bool> {
        match self.token.take() {
            Some(token) => self.lock.unlock(&self.key, &token).await,
            None => Ok(false),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let lock = self.lock.clone();
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = lock.unlock(&key, &token).await {
                        tracing::warn!(key = %key, error = %e, "Deferred lock release failed");
                    }
                });
            }
            Err(_) => {
                tracing::warn!(key = %key, "Lock guard dropped outside a runtime, waiting for lease expiry");
            }
        }
    }
}

/// Try to acquire `key` within `options.wait`. `Ok(None)` on timeout.
pub async fn acquire(
    lock: &Arc<dyn DistributedLock>,
    key: &str,
    options: LockOptions,
) -> CacheResult<Option<LockGuard>> {
    let token = lock.try_lock(key, options.wait, options.lease).await?;
    Ok(token.map(|token| LockGuard {
        lock: lock.clone(),
        key: key.to_string(),
        token: Some(token),
    }))
}

/// Run `action` while holding `key`.
///
/// `action` is not run when the lock cannot be acquired within the wait
/// budget; the caller gets [`CacheError::LockTimeout`] instead. The lock is
/// released after `action` returns, whether it succeeded or failed.
pub async fn with_lock<F, Fut, T, E>(
    lock: &Arc<dyn DistributedLock>,
    key: &str,
    options: LockOptions,
    action: F,
) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<CacheError>,
{
    let guard = acquire(lock, key, options)
        .await?
        .ok_or_else(|| CacheError::LockTimeout {
            key: key.to_string(),
            waited: options.wait,
        })?;

    let result = action().await;

    match guard.release().await {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(key = %key, lease = ?options.lease, "Lock lease expired before release");
        }
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Lock release failed, lease expiry will free it");
        }
    }

    result
}
