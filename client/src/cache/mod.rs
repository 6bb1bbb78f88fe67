//! Result caches keyed by [`CacheKey`].

#[cfg(feature = "redis")]
mod redis_store;

#[cfg(feature = "redis")]
pub use redis_store::{RedisCache, DEFAULT_EXPIRATION};

use crate::search::SearchResult;
use async_trait::async_trait;
use ig_cache_key::CacheKey;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cached value could not be (de)serialized: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Storage for decoded search results.
#[async_trait]
pub trait ResultCache: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<SearchResult>, CacheError>;

    async fn set(&self, key: &CacheKey, value: &SearchResult) -> Result<(), CacheError>;
}

/// Process-local cache with an optional time-to-live.
#[derive(Clone, Default)]
pub struct MemoryCache {
    ttl: Option<Duration>,
    entries: Arc<RwLock<HashMap<CacheKey, Entry>>>,
}

struct Entry {
    value: SearchResult,
    stored_at: Instant,
}

impl MemoryCache {
    /// Cache whose entries never expire.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache whose entries are dropped once older than `ttl`.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            entries: Arc::default(),
        }
    }

    pub async fn len(&self) -> usize {
        let mut entries = self.entries.write().await;
        self.prune_expired(&mut entries);
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn prune_expired(&self, entries: &mut HashMap<CacheKey, Entry>) {
        if let Some(ttl) = self.ttl {
            let now = Instant::now();
            entries.retain(|_, entry| now.duration_since(entry.stored_at) <= ttl);
        }
    }
}

#[async_trait]
impl ResultCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<SearchResult>, CacheError> {
        let mut entries = self.entries.write().await;
        self.prune_expired(&mut entries);
        Ok(entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &CacheKey, value: &SearchResult) -> Result<(), CacheError> {
        let mut entries = self.entries.write().await;
        self.prune_expired(&mut entries);
        entries.insert(
            key.clone(),
            Entry {
                value: value.clone(),
                stored_at: Instant::now(),
            },
        );
        Ok(())
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
