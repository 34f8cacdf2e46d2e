use std::time::Duration;

use tracing::warn;

/// Connection and caching settings for a persistent store client.
pub struct StoreConfig {
    /// Backend connection target, in whatever form the chosen adapter expects.
    pub url: String,
    /// Key prefix namespacing this logical store within a shared backend.
    pub prefix: String,
    /// Per-item cache TTL. `None` disables the caching layer entirely.
    pub cache_ttl: Option<Duration>,
}

impl StoreConfig {
    const DEFAULT_URL: &str = "localhost:6379";
    const DEFAULT_PREFIX: &str = "flagstore";
    const DEFAULT_CACHE_TTL_MS: u64 = 15_000;

    pub fn from_env() -> Self {
        let url = std::env::var("FLAGSTORE_URL").unwrap_or_else(|_| Self::DEFAULT_URL.to_string());
        let prefix =
            std::env::var("FLAGSTORE_PREFIX").unwrap_or_else(|_| Self::DEFAULT_PREFIX.to_string());
        let cache_ttl_ms = std::env::var("FLAGSTORE_CACHE_TTL_MS")
            .ok()
            .map(|raw| {
                raw.parse::<u64>().unwrap_or_else(|_| {
                    warn!(
                        "FLAGSTORE_CACHE_TTL_MS is not a number, using default {}ms",
                        Self::DEFAULT_CACHE_TTL_MS
                    );
                    Self::DEFAULT_CACHE_TTL_MS
                })
            })
            .unwrap_or(Self::DEFAULT_CACHE_TTL_MS);
        Self {
            url,
            prefix,
            // 0 means "no caching layer", not "expire immediately"
            cache_ttl: (cache_ttl_ms > 0).then(|| Duration::from_millis(cache_ttl_ms)),
        }
    }
}
