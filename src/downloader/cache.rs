use moka::future::Cache;
use std::future::Future;
use std::time::Duration;
use crate::errors::Result;

const MAX_ENTRIES: u64 = 256;

/// Cache for `yt-dlp --list-formats` output, keyed by URL.
pub struct FormatsCache {
    cache: Cache<String, String>,
}

impl FormatsCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(Duration::from_secs(ttl_seconds))
                .build(),
        }
    }

    pub async fn get(&self, url: &str) -> Option<String> {
        self.cache.get(url).await
    }

    /// Returns the cached listing or runs `fetch`. Failures are not cached.
    pub async fn get_or_fetch<F, Fut>(&self, url: &str, fetch: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if let Some(cached) = self.cache.get(url).await {
            log::debug!("Using cached format listing for {}", url);
            return Ok(cached);
        }

        let listing = fetch().await?;
        self.cache.insert(url.to_string(), listing.clone()).await;
        Ok(listing)
    }
}
