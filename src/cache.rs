//! Session-scoped TTL cache.
//!
//! Homepage sections are expensive to fetch and change slowly, so each one
//! is kept here for a few minutes. Entries live only as long as the process
//! (the equivalent of a browser tab's session storage); nothing is persisted
//! and there is no coherence between two running clients.
//!
//! Payloads are stored as JSON values so one cache can hold any serializable
//! snapshot. An entry whose payload no longer decodes as the requested type
//! is treated as a miss.

use lru::LruCache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Default time-to-live for homepage sections (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default number of datasets kept before least-recently-used eviction.
pub const DEFAULT_CAPACITY: usize = 64;

/// Whether a read may be served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Serve fresh entries, fetch otherwise.
    #[default]
    Default,
    /// Always fetch (pull-to-refresh), then store the new result.
    Reload,
}

/// A cached snapshot and the instant it was stored.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub payload: serde_json::Value,
    pub stored_at: Instant,
}

impl CachedEntry {
    /// An entry is valid only while `now - stored_at < ttl`.
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// Cloning shares the store. The lock is never held across a producer's
/// await, so concurrent reads of different keys fetch in parallel.
#[derive(Clone)]
pub struct SessionCache {
    entries: Arc<Mutex<LruCache<String, CachedEntry>>>,
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl SessionCache {
    /// Create a cache holding at most `capacity` datasets (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    fn entries(&self) -> MutexGuard<'_, LruCache<String, CachedEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Return the cached value for `key` if present, fresh and decodable.
    pub fn lookup<T: DeserializeOwned>(&self, key: &str, ttl: Duration) -> Option<T> {
        let now = Instant::now();
        let payload = {
            let mut entries = self.entries();
            let entry = entries.get(key)?;
            if !entry.is_fresh(ttl, now) {
                tracing::debug!(key, "Session cache entry stale");
                return None;
            }
            entry.payload.clone()
        };

        match serde_json::from_value(payload) {
            Ok(value) => {
                tracing::trace!(key, "Session cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::debug!(key, error = %e, "Session cache entry did not decode, treating as miss");
                None
            }
        }
    }

    /// Store `value` under `key` with the current timestamp, replacing any entry.
    ///
    /// Returns `false` when the value cannot be encoded; the previous entry is
    /// left untouched in that case.
    pub fn store<T: Serialize>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_value(value) {
            Ok(payload) => {
                self.entries().put(
                    key.to_string(),
                    CachedEntry {
                        payload,
                        stored_at: Instant::now(),
                    },
                );
                true
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to encode value for session cache");
                false
            }
        }
    }

    /// Return the fresh cached value for `key`, or run `producer` and cache its result.
    ///
    /// If `producer` fails, the existing entry (stale or missing) is left as is
    /// and the error is returned unchanged.
    pub async fn get<T, E, F, Fut>(&self, key: &str, ttl: Duration, producer: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_with_policy(key, ttl, CachePolicy::Default, producer)
            .await
    }

    /// Like [`SessionCache::get`], but `CachePolicy::Reload` skips the cache read.
    pub async fn get_with_policy<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        policy: CachePolicy,
        producer: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if policy == CachePolicy::Default {
            if let Some(value) = self.lookup(key, ttl) {
                return Ok(value);
            }
        }

        let value = producer().await?;
        self.store(key, &value);
        Ok(value)
    }

    /// Drop the entry for `key` so the next read refetches. Returns whether one existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let existed = self.entries().pop(key).is_some();
        if existed {
            tracing::debug!(key, "Session cache entry invalidated");
        }
        existed
    }

    pub fn clear(&self) {
        self.entries().clear();
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const TTL: Duration = Duration::from_millis(300_000);

    #[tokio::test(start_paused = true)]
    async fn test_get_within_ttl_calls_producer_once() {
        let cache = SessionCache::default();
        let calls = Cell::new(0);
        let calls = &calls;

        for _ in 0..2 {
            let value: Vec<i32> = cache
                .get("home_posts", TTL, move || async move {
                    calls.set(calls.get() + 1);
                    Ok::<_, String>(vec![1, 2, 3])
                })
                .await
                .unwrap();
            assert_eq!(value, vec![1, 2, 3]);
            tokio::time::advance(Duration::from_millis(1_000)).await;
        }

        assert_eq!(calls.get(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_ttl_calls_producer_again() {
        let cache = SessionCache::default();
        let calls = Cell::new(0);
        let calls = &calls;

        let produce = move || async move {
            calls.set(calls.get() + 1);
            Ok::<_, String>(calls.get())
        };

        let first: i32 = cache.get("home_banners", TTL, produce).await.unwrap();
        tokio::time::advance(TTL).await;
        let second: i32 = cache.get("home_banners", TTL, produce).await.unwrap();

        assert_eq!(calls.get(), 2);
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_stale_exactly_at_ttl() {
        let cache = SessionCache::default();
        cache.store("k", &1u8);
        tokio::time::advance(TTL - Duration::from_millis(1)).await;
        assert_eq!(cache.lookup::<u8>("k", TTL), Some(1));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.lookup::<u8>("k", TTL), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_producer_failure_leaves_entry_untouched() {
        let cache = SessionCache::default();
        cache.store("home_products", &vec!["old".to_string()]);
        tokio::time::advance(TTL).await;

        let result: Result<Vec<String>, String> = cache
            .get("home_products", TTL, || async { Err("offline".to_string()) })
            .await;
        assert_eq!(result.unwrap_err(), "offline");

        // Stale entry still there: a reload-free read with a longer TTL sees it.
        let old: Option<Vec<String>> = cache.lookup("home_products", TTL * 2);
        assert_eq!(old, Some(vec!["old".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_producer_failure_on_missing_entry_stores_nothing() {
        let cache = SessionCache::default();
        let result: Result<u32, &str> = cache.get("k", TTL, || async { Err("boom") }).await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refetch() {
        let cache = SessionCache::default();
        let calls = Cell::new(0);
        let calls = &calls;
        let produce = move || async move {
            calls.set(calls.get() + 1);
            Ok::<_, String>("payload".to_string())
        };

        let _: String = cache.get("home_posts", TTL, produce).await.unwrap();
        assert!(cache.invalidate("home_posts"));
        assert!(!cache.invalidate("home_posts"));
        let _: String = cache.get("home_posts", TTL, produce).await.unwrap();

        assert_eq!(calls.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_policy_bypasses_fresh_entry() {
        let cache = SessionCache::default();
        cache.store("home_companies", &1u32);

        let value: u32 = cache
            .get_with_policy("home_companies", TTL, CachePolicy::Reload, || async {
                Ok::<_, String>(2)
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(cache.lookup::<u32>("home_companies", TTL), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_undecodable_entry_is_a_miss() {
        let cache = SessionCache::default();
        cache.store("k", &"not a number");
        assert_eq!(cache.lookup::<u64>("k", TTL), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_least_recently_used() {
        let cache = SessionCache::new(2);
        cache.store("a", &1);
        cache.store("b", &2);
        let _ = cache.lookup::<i32>("a", TTL);
        cache.store("c", &3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.lookup::<i32>("a", TTL), Some(1));
        assert_eq!(cache.lookup::<i32>("b", TTL), None);
        assert_eq!(cache.lookup::<i32>("c", TTL), Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clones_share_entries() {
        let cache = SessionCache::default();
        let other = cache.clone();
        cache.store("home_banners", &vec![1u8]);
        assert_eq!(other.lookup::<Vec<u8>>("home_banners", TTL), Some(vec![1]));
        other.invalidate("home_banners");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_clamped_to_one() {
        let cache = SessionCache::new(0);
        assert!(cache.is_empty());
    }
}
