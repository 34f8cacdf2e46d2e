use std::future::Future;
use std::time::Duration;

use moka::future::Cache;
use shared::Result;

/// Expiration policy for a [`StoreCache`] instance.
///
/// Never-expiring entries are an ordinary policy value, so the permanent
/// initialization flag and the TTL-bounded item cache share one type.
#[derive(Clone, Copy, Debug)]
pub enum CachePolicy {
    /// No caching layer; every read goes to the source.
    Disabled,
    /// Entries live this long after each write.
    Ttl(Duration),
    /// Entries never expire.
    Infinite,
}

/// Read-through memoization layer over a moka future cache.
pub struct StoreCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    inner: Option<Cache<String, V>>,
}

impl<V> StoreCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(policy: CachePolicy) -> Self {
        let inner = match policy {
            CachePolicy::Disabled => None,
            CachePolicy::Ttl(ttl) => Some(Cache::builder().time_to_live(ttl).build()),
            CachePolicy::Infinite => Some(Cache::builder().build()),
        };
        Self { inner }
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// The live cached value, if any. Expired entries read as absent.
    pub async fn get(&self, key: &str) -> Option<V> {
        match &self.inner {
            Some(cache) => cache.get(key).await,
            None => None,
        }
    }

    /// Return the live cached value, or await `compute`, store its result
    /// with a fresh expiration, and return it.
    ///
    /// Errors from `compute` propagate and are never stored. Concurrent
    /// misses for one key may each run `compute`; there is no single-flight
    /// gate, so the computation must be a pure read.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let Some(cache) = &self.inner else {
            return compute().await;
        };
        if let Some(value) = cache.get(key).await {
            return Ok(value);
        }
        let value = compute().await?;
        cache.insert(key.to_string(), value.clone()).await;
        Ok(value)
    }

    /// Unconditionally overwrite an entry, resetting its expiration.
    pub async fn set(&self, key: &str, value: V) {
        if let Some(cache) = &self.inner {
            cache.insert(key.to_string(), value).await;
        }
    }

    /// Drop every entry.
    pub fn flush(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
        }
    }
}
