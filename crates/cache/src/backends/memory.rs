//! In-process TTL cache backed by a concurrent hash map.

use crate::error::{CacheError, CacheResult};
use crate::traits::CacheStore;
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Fields(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// TTL cache held in process memory.
///
/// Expired entries are invisible immediately and reclaimed lazily on access
/// or by [`MemoryCache::purge_expired`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    /// Remaining lifetime of a live entry. `None` if absent or expired,
    /// `Some(Duration::MAX)` if it never expires.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let entry = self.live(key)?;
        Some(match entry.expires_at {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        })
    }

    /// Spawn a background task purging expired entries every `interval`.
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let purged = self.purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, remaining = self.entries.len(), "Purged expired cache entries");
                }
            }
        })
    }

    /// Look up a live entry, reclaiming it if it has expired.
    fn live(&self, key: &str) -> Option<Entry> {
        let now = Instant::now();
        let entry = self.entries.get(key)?.clone();
        if entry.is_live(now) {
            Some(entry)
        } else {
            self.entries.remove_if(key, |_, e| !e.is_live(now));
            None
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text)),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> CacheResult<()> {
        // A TTL too large to represent never expires.
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        self.entries.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        Ok(self.live(key).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if entry.is_live(now) => {
                entry.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn field_set(&self, key: &str, field: &str, value: &str) -> CacheResult<()> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if !entry.is_live(now) {
                    *entry = Entry {
                        value: Value::Fields(HashMap::new()),
                        expires_at: None,
                    };
                }
                match &mut entry.value {
                    Value::Fields(fields) => {
                        fields.insert(field.to_string(), value.to_string());
                        Ok(())
                    }
                    Value::Text(_) => Err(CacheError::WrongType(key.to_string())),
                }
            }
            MapEntry::Vacant(vacant) => {
                let mut fields = HashMap::new();
                fields.insert(field.to_string(), value.to_string());
                vacant.insert(Entry {
                    value: Value::Fields(fields),
                    expires_at: None,
                });
                Ok(())
            }
        }
    }

    async fn field_get(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Fields(fields),
                ..
            }) => Ok(fields.get(field).cloned()),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn field_delete_all(&self, key: &str) -> CacheResult<bool> {
        match self.live(key) {
            None => Ok(false),
            Some(Entry {
                value: Value::Fields(_),
                ..
            }) => Ok(self.entries.remove(key).is_some()),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("a").await.unwrap(), None);

        cache.set("a", "1", None).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("1"));
        assert!(cache.exists("a").await.unwrap());

        cache.set("a", "2", None).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap().as_deref(), Some("2"));

        assert!(cache.delete("a").await.unwrap());
        assert!(!cache.delete("a").await.unwrap());
        assert!(!cache.exists("a").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("a", "1", Some(Duration::from_secs(10)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(cache.exists("a").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert!(cache.is_empty(), "expired entry should be reclaimed on access");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_extends_live_key_only() {
        let cache = MemoryCache::new();
        assert!(!cache.expire("missing", Duration::from_secs(5)).await.unwrap());

        cache
            .set("a", "1", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(cache.expire("a", Duration::from_secs(60)).await.unwrap());

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(cache.exists("a").await.unwrap());
    }

    #[tokio::test]
    async fn test_unrepresentable_ttl_never_expires() {
        let cache = MemoryCache::new();
        cache
            .set("a", "1", Some(Duration::from_secs(u64::MAX)))
            .await
            .unwrap();
        assert_eq!(cache.ttl("a"), Some(Duration::MAX));

        cache
            .set("b", "1", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(cache.expire("b", Duration::MAX).await.unwrap());
        assert_eq!(cache.ttl("b"), Some(Duration::MAX));
        assert_eq!(cache.get("b").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache
            .set("short", "1", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        cache.set("forever", "1", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_fields() {
        let cache = MemoryCache::new();
        cache.field_set("session", "user", "alice").await.unwrap();
        cache.field_set("session", "token", "t1").await.unwrap();

        assert_eq!(
            cache.field_get("session", "user").await.unwrap().as_deref(),
            Some("alice")
        );
        assert_eq!(cache.field_get("session", "missing").await.unwrap(), None);

        assert!(cache.field_delete_all("session").await.unwrap());
        assert_eq!(cache.field_get("session", "user").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wrong_type() {
        let cache = MemoryCache::new();
        cache.set("text", "1", None).await.unwrap();
        assert!(matches!(
            cache.field_set("text", "f", "v").await,
            Err(CacheError::WrongType(_))
        ));

        cache.field_set("hash", "f", "v").await.unwrap();
        assert!(matches!(
            cache.get("hash").await,
            Err(CacheError::WrongType(_))
        ));
    }
}
