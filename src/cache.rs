use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::Url;
use tracing::debug;

use crate::error::LoadError;
use crate::loader::ContentLoader;

/// Cache configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum number of cached documents
    pub max_entries: u64,
    /// Time-to-live for a cached document in seconds
    pub ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            ttl_seconds: 300,
        }
    }
}

/// Loader decorator that keeps fetched schema text in memory
///
/// Uses `moka` for concurrent access and "thundering herd" protection: a
/// URL requested by many validations at once is fetched by a single leader
/// while the others wait for its result. Failures are never cached.
pub struct CachingLoader<L> {
    inner: L,
    cache: Cache<String, Arc<String>>,
}

impl<L: ContentLoader> CachingLoader<L> {
    pub fn new(inner: L, config: &CacheConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(Duration::from_secs(config.ttl_seconds))
            .build();

        Self { inner, cache }
    }

    /// Number of cached documents, after pending maintenance has run
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }

    pub fn contains(&self, location: &Url) -> bool {
        self.cache.contains_key(location.as_str())
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }
}

#[async_trait]
impl<L: ContentLoader> ContentLoader for CachingLoader<L> {
    async fn load(&self, location: &Url) -> Result<String, LoadError> {
        let text = self
            .cache
            .try_get_with(location.to_string(), async {
                debug!(url = %location, "Schema cache miss");
                self.inner.load(location).await.map(Arc::new)
            })
            .await
            .map_err(|e| (*e).clone())?;

        Ok(text.as_ref().clone())
    }
}
