//! In-memory response cache
//!
//! A bounded key/value store with per-entry TTL and tag-based invalidation.
//! Values are stored as JSON so any serializable response can be cached.
//! When the cache is full the oldest entry is evicted.

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to serialize cache value: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

impl From<CacheError> for crate::core::error::AppError {
    fn from(err: CacheError) -> Self {
        crate::core::error::AppError::SerializationError(err.to_string())
    }
}

/// Build a cache key from a prefix and a digest of arbitrary parameters
pub fn hashed_key<P: Serialize>(prefix: &str, params: &P) -> String {
    let encoded = serde_json::to_vec(params).unwrap_or_default();
    let digest = Sha256::digest(&encoded);
    format!("{}:{:x}", prefix, digest)
}

struct CacheEntry {
    value: serde_json::Value,
    inserted_at: Instant,
    expires_at: Instant,
    tags: Vec<String>,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    tag_index: HashMap<String, HashSet<String>>,
    hits: u64,
    misses: u64,
    evictions: u64,
    /// Bumped by every invalidation; a load started under an older
    /// generation may hold stale data and is not stored
    generation: u64,
}

impl CacheState {
    fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        for tag in &entry.tags {
            if let Some(keys) = self.tag_index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tag_index.remove(tag);
                }
            }
        }
        Some(entry)
    }

    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.remove(key);
        }
        expired.len()
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.inserted_at)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            self.remove(&key);
            self.evictions += 1;
        }
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub max_size: usize,
    pub tags: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

/// Cache manager shared by the request handlers
pub struct CacheManager {
    state: Mutex<CacheState>,
    enabled: bool,
    max_size: usize,
    default_ttl: Duration,
}

impl CacheManager {
    pub fn new(enabled: bool, max_size: usize, default_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            enabled,
            max_size,
            default_ttl,
        }
    }

    pub fn from_config(config: &crate::core::config::CacheConfig) -> Self {
        Self::new(config.enabled, config.max_size, Duration::from_secs(config.default_ttl))
    }

    /// Fetch a raw value; expired entries count as misses and are dropped
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        if !self.enabled {
            return None;
        }
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let lookup = state
            .entries
            .get(key)
            .map(|entry| (entry.expires_at > now, entry.value.clone()));
        match lookup {
            Some((true, value)) => {
                state.hits += 1;
                return Some(value);
            }
            Some((false, _)) => {
                state.remove(key);
            }
            None => {}
        }
        state.misses += 1;
        None
    }

    /// Fetch and deserialize a value; undecodable entries are treated as misses
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        serde_json::from_value(value).ok()
    }

    /// Store a value under `key` with optional TTL and tags
    pub async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl: Option<Duration>,
        tags: &[&str],
    ) {
        if !self.enabled {
            return;
        }
        let mut state = self.state.lock().await;
        Self::insert(&mut state, self.max_size, key, value, ttl.unwrap_or(self.default_ttl), tags);
    }

    fn insert(
        state: &mut CacheState,
        max_size: usize,
        key: &str,
        value: serde_json::Value,
        ttl: Duration,
        tags: &[&str],
    ) {
        let now = Instant::now();

        state.remove(key);
        if state.entries.len() >= max_size {
            state.purge_expired(now);
        }
        while state.entries.len() >= max_size {
            state.evict_oldest();
        }

        let tags: Vec<String> = tags.iter().map(|t| t.to_string()).collect();
        for tag in &tags {
            state.tag_index.entry(tag.clone()).or_default().insert(key.to_string());
        }
        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: now,
                expires_at: now + ttl,
                tags,
            },
        );
    }

    /// Serialize and store a value
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        tags: &[&str],
    ) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl, tags).await;
        Ok(())
    }

    /// Return the cached value or compute, store and return it
    ///
    /// The computed value is not stored if an invalidation ran while it was
    /// loading.
    pub async fn get_or_insert_with<T, F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        tags: &[&str],
        load: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<CacheError>,
    {
        if let Some(cached) = self.get_json::<T>(key).await {
            tracing::debug!(key = key, "Cache hit");
            return Ok(cached);
        }
        let generation = self.state.lock().await.generation;
        let value = load().await?;
        if !self.enabled {
            return Ok(value);
        }

        let encoded = serde_json::to_value(&value).map_err(CacheError::from)?;
        let mut state = self.state.lock().await;
        if state.generation == generation {
            Self::insert(&mut state, self.max_size, key, encoded, ttl.unwrap_or(self.default_ttl), tags);
        } else {
            tracing::debug!(key = key, "Cache invalidated during load, not storing");
        }
        Ok(value)
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.state.lock().await.remove(key).is_some()
    }

    /// Drop every entry carrying `tag`, returning how many were removed
    pub async fn invalidate_tag(&self, tag: &str) -> usize {
        let mut state = self.state.lock().await;
        state.generation += 1;
        let keys: Vec<String> = state
            .tag_index
            .get(tag)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default();
        for key in &keys {
            state.remove(key);
        }
        if !keys.is_empty() {
            tracing::debug!(tag = tag, removed = keys.len(), "Cache tag invalidated");
        }
        keys.len()
    }

    /// Invalidate several tags at once
    pub async fn invalidate_tags(&self, tags: &[&str]) -> usize {
        let mut removed = 0;
        for tag in tags {
            removed += self.invalidate_tag(tag).await;
        }
        removed
    }

    pub async fn clear(&self) -> usize {
        let mut state = self.state.lock().await;
        state.generation += 1;
        let removed = state.entries.len();
        state.entries.clear();
        state.tag_index.clear();
        removed
    }

    pub async fn cleanup_expired(&self) -> usize {
        self.state.lock().await.purge_expired(Instant::now())
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let lookups = state.hits + state.misses;
        CacheStats {
            enabled: self.enabled,
            entries: state.entries.len(),
            max_size: self.max_size,
            tags: state.tag_index.len(),
            hits: state.hits,
            misses: state.misses,
            evictions: state.evictions,
            hit_rate: if lookups == 0 { 0.0 } else { state.hits as f64 / lookups as f64 },
        }
    }

    /// Periodically purge expired entries
    pub fn spawn_cleanup(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let removed = cache.cleanup_expired().await;
                if removed > 0 {
                    tracing::debug!(removed = removed, "Expired cache entries purged");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(max_size: usize) -> CacheManager {
        CacheManager::new(true, max_size, Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_set_get_and_stats() {
        let cache = cache(10);
        assert!(cache.get("missing").await.is_none());

        cache.set("k", json!({"a": 1}), None, &[]).await;
        assert_eq!(cache.get("k").await, Some(json!({"a": 1})));

        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = cache(10);
        cache.set("short", json!(1), Some(Duration::from_millis(20)), &[]).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(cache.get("short").await.is_none());
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_evicts_oldest_when_full() {
        let cache = cache(2);
        cache.set("first", json!(1), None, &[]).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set("second", json!(2), None, &[]).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        cache.set("third", json!(3), None, &[]).await;

        assert!(cache.get("first").await.is_none());
        assert!(cache.get("second").await.is_some());
        assert!(cache.get("third").await.is_some());
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn test_tag_invalidation() {
        let cache = cache(10);
        cache.set("books:list:1", json!([]), None, &["books"]).await;
        cache.set("books:detail:7", json!({}), None, &["books", "book:7"]).await;
        cache.set("tags:list", json!([]), None, &["tags"]).await;

        assert_eq!(cache.invalidate_tag("book:7").await, 1);
        assert!(cache.get("books:detail:7").await.is_none());
        assert!(cache.get("books:list:1").await.is_some());

        assert_eq!(cache.invalidate_tag("books").await, 1);
        assert!(cache.get("tags:list").await.is_some());
        assert_eq!(cache.stats().await.tags, 1);
    }

    #[tokio::test]
    async fn test_get_or_insert_with_loads_once() {
        let cache = cache(10);
        let calls = std::sync::atomic::AtomicUsize::new(0);

        for _ in 0..3 {
            let value: std::result::Result<Vec<u32>, CacheError> = cache
                .get_or_insert_with("numbers", None, &[], || async {
                    calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(vec![1, 2, 3])
                })
                .await;
            assert_eq!(value.unwrap(), vec![1, 2, 3]);
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_load_racing_an_invalidation_is_not_stored() {
        let cache = cache(10);

        let stale: std::result::Result<u32, CacheError> = cache
            .get_or_insert_with("count", None, &["books"], || async {
                // a write lands while the old value is being read
                cache.invalidate_tag("books").await;
                Ok(1)
            })
            .await;
        assert_eq!(stale.unwrap(), 1);
        assert!(cache.get("count").await.is_none());

        let fresh: std::result::Result<u32, CacheError> = cache
            .get_or_insert_with("count", None, &["books"], || async { Ok(2) })
            .await;
        assert_eq!(fresh.unwrap(), 2);
        assert_eq!(cache.get_json::<u32>("count").await, Some(2));
    }

    #[tokio::test]
    async fn test_disabled_cache_stores_nothing() {
        let cache = CacheManager::new(false, 10, Duration::from_secs(60));
        cache.set("k", json!(1), None, &[]).await;
        assert!(cache.get("k").await.is_none());
    }

    #[test]
    fn test_hashed_key_is_stable() {
        let a = hashed_key("books:list", &json!({"page": 1, "search": "rust"}));
        let b = hashed_key("books:list", &json!({"page": 1, "search": "rust"}));
        let c = hashed_key("books:list", &json!({"page": 2, "search": "rust"}));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("books:list:"));
    }
}
